//! Arithmetic expressions over secret inputs.
//!
//! A circuit is described by an [`Expression`] tree whose leaves are either
//! [`Secret`] handles (private inputs, one owner each) or public scalar
//! constants. Secrets are compared by identity: each handle carries an id
//! that is unique per construction, and that id is what routes the shares of
//! that input between parties.
//!
//! Multiplication nodes also carry a construction-unique id, because each one
//! consumes its own Beaver triple. Evaluating the same tree twice would reuse
//! triples, so a [`Circuit`] wraps an expression together with a random run
//! nonce; triples and message labels are namespaced by that nonce.
use std::sync::atomic::{AtomicU64, Ordering};

use auto_ops::impl_op_ex;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::field::MODULUS;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies one secret input of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretId(u64);

impl SecretId {
    pub(crate) fn bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

/// Identifies one multiplication node of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(u64);

impl OpId {
    pub(crate) fn bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

/// A handle to a secret input.
///
/// The party owning the underlying value maps this handle to it when starting
/// an evaluation; everybody else only ever sees shares addressed by its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret {
    id: SecretId,
}

impl Secret {
    /// Create a new secret input, distinct from all others.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: SecretId(fresh_id()),
        }
    }

    /// The id identifying this input.
    pub fn id(&self) -> SecretId {
        self.id
    }
}

/// An arithmetic expression over secrets and public constants.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A secret input, identified by its id.
    Secret(SecretId),
    /// A public constant, reduced mod Q at evaluation time.
    Scalar(u64),
    /// The sum of two subexpressions.
    Add(Box<Expression>, Box<Expression>),
    /// The difference of two subexpressions.
    Sub(Box<Expression>, Box<Expression>),
    /// The product of two subexpressions.
    ///
    /// The operator id indexes the Beaver triple this node consumes when both
    /// sides contain secrets.
    Mul(OpId, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// A public constant expression.
    pub fn scalar(value: u64) -> Self {
        Expression::Scalar(value)
    }

    /// If this expression contains no secret, its public value mod Q.
    ///
    /// Returns `None` as soon as any leaf is a secret; every party computes
    /// the same answer, which is what lets a multiplication treat a public
    /// operand as a cleartext factor.
    pub fn public_value(&self) -> Option<u64> {
        match self {
            Expression::Secret(_) => None,
            Expression::Scalar(k) => Some(k % MODULUS),
            Expression::Add(l, r) => Some((l.public_value()? + r.public_value()?) % MODULUS),
            Expression::Sub(l, r) => {
                Some((l.public_value()? + MODULUS - r.public_value()?) % MODULUS)
            }
            Expression::Mul(_, l, r) => Some((l.public_value()? * r.public_value()?) % MODULUS),
        }
    }

    /// The ids of the multiplication nodes in this expression, in post-order.
    #[cfg(test)]
    pub(crate) fn mul_ops(&self) -> Vec<OpId> {
        fn walk(expr: &Expression, out: &mut Vec<OpId>) {
            match expr {
                Expression::Secret(_) | Expression::Scalar(_) => {}
                Expression::Add(l, r) | Expression::Sub(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Expression::Mul(op, l, r) => {
                    walk(l, out);
                    walk(r, out);
                    out.push(*op);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

impl From<Secret> for Expression {
    fn from(secret: Secret) -> Self {
        Expression::Secret(secret.id)
    }
}

impl_op_ex!(+ |a: &Expression, b: &Expression| -> Expression {
    Expression::Add(Box::new(a.clone()), Box::new(b.clone()))
});
impl_op_ex!(-|a: &Expression, b: &Expression| -> Expression {
    Expression::Sub(Box::new(a.clone()), Box::new(b.clone()))
});
impl_op_ex!(*|a: &Expression, b: &Expression| -> Expression {
    Expression::Mul(OpId(fresh_id()), Box::new(a.clone()), Box::new(b.clone()))
});

/// Namespaces one evaluation of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    pub(crate) fn bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

/// Keys a Beaver triple: one per multiplication node, per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripleId {
    run: RunId,
    op: OpId,
}

/// An expression bound to a fresh run nonce.
///
/// Every party in a run must hold the same circuit, so it is built once and
/// distributed as part of the protocol setup.
#[derive(Debug, Clone)]
pub struct Circuit {
    expr: Expression,
    run: RunId,
}

impl Circuit {
    /// Bind an expression to a fresh nonce, claiming a fresh batch of triples.
    ///
    /// To evaluate the same expression again, build a new circuit.
    pub fn new(rng: &mut impl CryptoRngCore, expr: Expression) -> Self {
        Self {
            expr,
            run: RunId(rng.next_u64()),
        }
    }

    /// The expression this circuit evaluates.
    pub fn expression(&self) -> &Expression {
        &self.expr
    }

    /// The nonce namespacing this run.
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// The triple key for a multiplication node of this circuit.
    pub(crate) fn triple_id(&self, op: OpId) -> TripleId {
        TripleId { run: self.run, op }
    }
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;

    #[test]
    fn test_secret_ids_are_distinct() {
        let a = Secret::new();
        let b = Secret::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_public_value() {
        let expr = (Expression::scalar(3) + Expression::scalar(4)) * Expression::scalar(2)
            - Expression::scalar(1);
        assert_eq!(expr.public_value(), Some(13));

        let secret = Expression::from(Secret::new());
        let mixed = Expression::scalar(3) + secret;
        assert_eq!(mixed.public_value(), None);
    }

    #[test]
    fn test_mul_ops_are_distinct() {
        let a = Expression::from(Secret::new());
        let b = Expression::from(Secret::new());
        let expr = a.clone() * b.clone() + b * a;
        let ops = expr.mul_ops();
        assert_eq!(ops.len(), 2);
        assert_ne!(ops[0], ops[1]);
    }

    #[test]
    fn test_circuits_namespace_triples() {
        let a = Expression::from(Secret::new());
        let b = Expression::from(Secret::new());
        let expr = a * b;
        let op = expr.mul_ops()[0];
        let first = Circuit::new(&mut OsRng, expr.clone());
        let second = Circuit::new(&mut OsRng, expr);
        assert_ne!(first.triple_id(op), second.triple_id(op));
    }
}
