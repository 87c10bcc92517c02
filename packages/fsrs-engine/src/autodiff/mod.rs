//! Reverse-mode differentiation tape
//!
//! The memory model is written once against the [`Real`] scalar trait and
//! evaluated either on plain `f64` (scheduling, evaluation, simulation) or on
//! tape variables [`Var`] (training).
//!
//! Design:
//! - A [`Tape`] is an arena of nodes; each node stores the indices of at most
//!   two parents and the local partial derivative with respect to each.
//! - Nodes are appended in evaluation order, so parents always have smaller
//!   indices than their children.
//! - [`Tape::gradient`] sweeps the arena once in reverse, accumulating
//!   adjoints into a flat buffer indexed by node position.
//!
//! One tape is built per training item and dropped after its backward pass.

use std::cell::RefCell;
use std::ops::{Add, Div, Mul, Neg, Sub};

// ==================== Scalar Trait ====================

/// Scalar operations the memory model needs
pub trait Real:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// Primal value
    fn value(self) -> f64;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn recip(self) -> Self;
    /// `self^exponent` for a positive base
    fn powf(self, exponent: Self) -> Self;
    /// `self^exponent` with a constant exponent
    fn powc(self, exponent: f64) -> Self;
    /// Clamped values carry no gradient
    fn clamp(self, min: f64, max: f64) -> Self;
    fn min(self, other: Self) -> Self;
}

impl Real for f64 {
    fn value(self) -> f64 {
        self
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn recip(self) -> Self {
        f64::recip(self)
    }

    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }

    fn powc(self, exponent: f64) -> Self {
        f64::powf(self, exponent)
    }

    fn clamp(self, min: f64, max: f64) -> Self {
        f64::clamp(self, min, max)
    }

    fn min(self, other: Self) -> Self {
        f64::min(self, other)
    }
}

// ==================== Tape ====================

#[derive(Clone, Copy, Debug)]
struct Node {
    parents: [usize; 2],
    partials: [f64; 2],
}

/// Arena of recorded operations
#[derive(Debug, Default)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    /// Number of recorded nodes
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Register an independent variable (or a constant)
    pub fn var(&self, value: f64) -> Var<'_> {
        let index = self.push([0.0, 0.0], None);
        Var {
            tape: self,
            index,
            value,
        }
    }

    fn push(&self, partials: [f64; 2], parents: Option<[usize; 2]>) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let index = nodes.len();
        nodes.push(Node {
            // Leaves point at themselves with zero partials
            parents: parents.unwrap_or([index, index]),
            partials,
        });
        index
    }

    fn unary<'t>(&'t self, a: Var<'t>, value: f64, partial: f64) -> Var<'t> {
        let index = self.push([partial, 0.0], Some([a.index, a.index]));
        Var {
            tape: self,
            index,
            value,
        }
    }

    fn binary<'t>(&'t self, a: Var<'t>, b: Var<'t>, value: f64, pa: f64, pb: f64) -> Var<'t> {
        debug_assert!(std::ptr::eq(a.tape, b.tape), "variables from different tapes");
        let index = self.push([pa, pb], Some([a.index, b.index]));
        Var {
            tape: self,
            index,
            value,
        }
    }

    /// Backward pass: d(output)/d(node) for every node recorded so far
    pub fn gradient(&self, output: Var<'_>) -> Gradient {
        let nodes = self.nodes.borrow();
        let mut adjoints = vec![0.0; nodes.len()];
        adjoints[output.index] = 1.0;

        for i in (0..=output.index).rev() {
            let adjoint = adjoints[i];
            if adjoint == 0.0 {
                continue;
            }
            let node = nodes[i];
            adjoints[node.parents[0]] += node.partials[0] * adjoint;
            adjoints[node.parents[1]] += node.partials[1] * adjoint;
        }

        Gradient { adjoints }
    }
}

/// Adjoints produced by [`Tape::gradient`]
#[derive(Debug, Clone)]
pub struct Gradient {
    adjoints: Vec<f64>,
}

impl Gradient {
    /// Partial derivative of the output with respect to `var`
    pub fn wrt(&self, var: Var<'_>) -> f64 {
        self.adjoints.get(var.index).copied().unwrap_or(0.0)
    }
}

// ==================== Tape Variable ====================

/// Value recorded on a [`Tape`]
#[derive(Clone, Copy, Debug)]
pub struct Var<'t> {
    tape: &'t Tape,
    index: usize,
    value: f64,
}

impl<'t> Add for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: Var<'t>) -> Var<'t> {
        self.tape.binary(self, rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl<'t> Sub for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: Var<'t>) -> Var<'t> {
        self.tape.binary(self, rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl<'t> Mul for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: Var<'t>) -> Var<'t> {
        self.tape
            .binary(self, rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl<'t> Div for Var<'t> {
    type Output = Var<'t>;

    fn div(self, rhs: Var<'t>) -> Var<'t> {
        let value = self.value / rhs.value;
        self.tape
            .binary(self, rhs, value, 1.0 / rhs.value, -value / rhs.value)
    }
}

impl<'t> Neg for Var<'t> {
    type Output = Var<'t>;

    fn neg(self) -> Var<'t> {
        self.tape.unary(self, -self.value, -1.0)
    }
}

impl<'t> Add<f64> for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: f64) -> Var<'t> {
        self.tape.unary(self, self.value + rhs, 1.0)
    }
}

impl<'t> Sub<f64> for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: f64) -> Var<'t> {
        self.tape.unary(self, self.value - rhs, 1.0)
    }
}

impl<'t> Mul<f64> for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: f64) -> Var<'t> {
        self.tape.unary(self, self.value * rhs, rhs)
    }
}

impl<'t> Div<f64> for Var<'t> {
    type Output = Var<'t>;

    fn div(self, rhs: f64) -> Var<'t> {
        self.tape.unary(self, self.value / rhs, 1.0 / rhs)
    }
}

impl<'t> Real for Var<'t> {
    fn value(self) -> f64 {
        self.value
    }

    fn exp(self) -> Self {
        let value = self.value.exp();
        self.tape.unary(self, value, value)
    }

    fn ln(self) -> Self {
        self.tape.unary(self, self.value.ln(), 1.0 / self.value)
    }

    fn recip(self) -> Self {
        let value = 1.0 / self.value;
        self.tape.unary(self, value, -value * value)
    }

    fn powf(self, exponent: Self) -> Self {
        let value = self.value.powf(exponent.value);
        let d_base = exponent.value * self.value.powf(exponent.value - 1.0);
        let d_exponent = if self.value > 0.0 {
            value * self.value.ln()
        } else {
            0.0
        };
        self.tape.binary(self, exponent, value, d_base, d_exponent)
    }

    fn powc(self, exponent: f64) -> Self {
        let value = self.value.powf(exponent);
        let partial = exponent * self.value.powf(exponent - 1.0);
        self.tape.unary(self, value, partial)
    }

    fn clamp(self, min: f64, max: f64) -> Self {
        if self.value < min {
            self.tape.var(min)
        } else if self.value > max {
            self.tape.var(max)
        } else {
            self
        }
    }

    fn min(self, other: Self) -> Self {
        if self.value <= other.value {
            self
        } else {
            other
        }
    }
}
