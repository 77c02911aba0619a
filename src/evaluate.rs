//! The party evaluator: joint evaluation of a circuit on additive shares.
//!
//! Each party contributes its private inputs, and everybody learns the value
//! of the circuit and nothing else. A run has four phases: share out your
//! own inputs, evaluate the expression bottom-up on shares, publish your
//! share of the result, and reconstruct the result from everybody's shares.
//!
//! Addition and subtraction are local, since additive sharing is linear.
//! Multiplying by a public value is local as well. Multiplying two
//! secret-dependent values consumes a Beaver triple and costs one broadcast
//! round: every party opens the masked differences `x - a` and `y - b`, and
//! the products of the openings patch the triple's `c` into a sharing of
//! `x * y`.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand_core::CryptoRngCore;

use crate::expr::{Circuit, Expression, OpId, Secret, SecretId};
use crate::field::{reconstruct_secret, share_secret, Share, MODULUS};
use crate::participants::ParticipantList;
use crate::protocol::internal::{make_protocol, Communicator, Context, Label};
use crate::protocol::{InitializationError, Participant, Protocol, ProtocolError};
use crate::ttp::TripleSource;

struct Party {
    chan: Communicator,
    participants: ParticipantList,
    me: Participant,
    circuit: Circuit,
    triples: Arc<dyn TripleSource>,
    /// Shares of secret inputs: our own, plus everything received so far.
    ///
    /// Received shares are cached because an expression may reference the
    /// same secret more than once, while the share message arrives only once.
    shares: HashMap<SecretId, Share>,
}

impl Party {
    /// Split each of our inputs into shares and hand them out.
    async fn distribute_inputs(
        &mut self,
        rng: &mut impl CryptoRngCore,
        inputs: &HashMap<SecretId, u64>,
    ) {
        for (&id, &value) in inputs {
            let shares = share_secret(rng, value, self.participants.len());
            for (i, p) in self.participants.clone().iter().enumerate() {
                if p == self.me {
                    self.shares.insert(id, shares[i]);
                } else {
                    self.chan
                        .send_private_message(p, Label::Share(id), &shares[i])
                        .await;
                }
            }
        }
    }

    /// Our share of a secret input, retrieving it if we don't hold it yet.
    async fn secret_share(&mut self, id: SecretId) -> Result<Share, ProtocolError> {
        if let Some(&share) = self.shares.get(&id) {
            return Ok(share);
        }
        let share: Share = self.chan.retrieve_private_message(Label::Share(id)).await?;
        self.shares.insert(id, share);
        Ok(share)
    }

    /// Whether we are the party that carries public constants.
    fn carries_constants(&self) -> bool {
        self.me == self.participants.designated()
    }

    /// A valid additive sharing of a public value: the designated party
    /// holds it, everybody else holds zero.
    fn constant_share(&self, value: u64) -> Share {
        if self.carries_constants() {
            Share::from_residue(value)
        } else {
            Share::ZERO
        }
    }

    /// Evaluate an expression bottom-up, producing our share of its value.
    fn eval<'a>(
        &'a mut self,
        expr: &'a Expression,
    ) -> Pin<Box<dyn Future<Output = Result<Share, ProtocolError>> + Send + 'a>> {
        Box::pin(async move {
            match expr {
                Expression::Secret(id) => self.secret_share(*id).await,
                Expression::Scalar(k) => Ok(self.constant_share(*k)),
                Expression::Add(l, r) => Ok(self.eval(l).await? + self.eval(r).await?),
                Expression::Sub(l, r) => Ok(self.eval(l).await? - self.eval(r).await?),
                Expression::Mul(op, l, r) => match (l.public_value(), r.public_value()) {
                    // No secret anywhere below: the product is public, and
                    // the designated party carries it like any constant.
                    (Some(kl), Some(kr)) => Ok(self.constant_share((kl * kr) % MODULUS)),
                    // One public side: it is a cleartext factor known to
                    // all, and scaling distributes over the sharing.
                    (Some(k), None) => Ok(self.eval(r).await? * k),
                    (None, Some(k)) => Ok(self.eval(l).await? * k),
                    (None, None) => {
                        let x = self.eval(l).await?;
                        let y = self.eval(r).await?;
                        self.beaver_multiply(*op, x, y).await
                    }
                },
            }
        })
    }

    /// Multiply two secret sharings using the Beaver triple for this node.
    async fn beaver_multiply(
        &mut self,
        op: OpId,
        x: Share,
        y: Share,
    ) -> Result<Share, ProtocolError> {
        let triple = self
            .triples
            .take_triple_shares(self.me, self.circuit.triple_id(op))?;

        let d_i = x - triple.a;
        let e_i = y - triple.b;
        self.chan.publish_message(Label::BeaverD(op), &d_i).await;
        self.chan.publish_message(Label::BeaverE(op), &e_i).await;

        // Every party must open before anyone can continue; blocking on
        // each peer in turn is that barrier.
        let mut d = d_i;
        let mut e = e_i;
        for p in self.participants.clone().others(self.me) {
            let d_j: Share = self
                .chan
                .retrieve_public_message(p, Label::BeaverD(op))
                .await?;
            let e_j: Share = self
                .chan
                .retrieve_public_message(p, Label::BeaverE(op))
                .await?;
            d += d_j;
            e += e_j;
        }

        let mut z = triple.c + x * e + y * d;
        // The correction term is public, so exactly one party applies it.
        if self.carries_constants() {
            z -= d * e;
        }
        Ok(z)
    }
}

async fn do_evaluate(
    mut rng: impl CryptoRngCore + Send,
    chan: Communicator,
    participants: ParticipantList,
    me: Participant,
    circuit: Circuit,
    inputs: HashMap<SecretId, u64>,
    triples: Arc<dyn TripleSource>,
) -> Result<u64, ProtocolError> {
    let mut party = Party {
        chan,
        participants,
        me,
        circuit,
        triples,
        shares: HashMap::new(),
    };

    party.distribute_inputs(&mut rng, &inputs).await;

    let expr = party.circuit.expression().clone();
    let result_share = party.eval(&expr).await?;

    party.chan.publish_message(Label::Output, &result_share).await;

    let mut result_shares = vec![result_share];
    for p in party.participants.clone().others(me) {
        let share: Share = party
            .chan
            .retrieve_public_message(p, Label::Output)
            .await?;
        result_shares.push(share);
    }

    Ok(reconstruct_secret(&result_shares))
}

/// Run one party's side of a joint circuit evaluation.
///
/// Every party must pass the same participant list and the same circuit;
/// `inputs` assigns values to the secrets this party owns. The returned
/// protocol yields the reconstructed result once every party has published
/// its share.
pub fn evaluate(
    rng: impl CryptoRngCore + Send + 'static,
    participants: &[Participant],
    me: Participant,
    circuit: Circuit,
    inputs: HashMap<Secret, u64>,
    triples: Arc<dyn TripleSource>,
) -> Result<impl Protocol<Output = u64>, InitializationError> {
    if participants.len() < 2 {
        return Err(InitializationError::BadParameters(format!(
            "participant count cannot be < 2, found: {}",
            participants.len()
        )));
    }
    let participants = ParticipantList::new(participants).ok_or_else(|| {
        InitializationError::BadParameters("participant list cannot contain duplicates".to_string())
    })?;
    if !participants.contains(me) {
        return Err(InitializationError::BadParameters(format!(
            "evaluating party {:?} is not a participant",
            me
        )));
    }

    let inputs: HashMap<SecretId, u64> = inputs.into_iter().map(|(s, v)| (s.id(), v)).collect();

    let ctx = Context::new();
    let chan = ctx.communicator(circuit.run_id(), me);
    let fut = do_evaluate(rng, chan, participants, me, circuit, inputs, triples);
    Ok(make_protocol(ctx, fut))
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::protocol::run_protocol;
    use crate::ttp::TrustedDealer;

    fn run_circuit(
        expr: Expression,
        inputs: Vec<(Secret, u64)>,
        owners: Vec<Vec<usize>>,
    ) -> Vec<u64> {
        let participants: Vec<Participant> =
            (0..owners.len() as u32).map(Participant::from).collect();
        let dealer: Arc<dyn TripleSource> =
            Arc::new(TrustedDealer::new(&participants).unwrap());
        let circuit = Circuit::new(&mut OsRng, expr);

        let mut protocols: Vec<(Participant, Box<dyn Protocol<Output = u64>>)> =
            Vec::with_capacity(participants.len());
        for (i, p) in participants.iter().enumerate() {
            let my_inputs: HashMap<Secret, u64> =
                owners[i].iter().map(|&j| inputs[j]).collect();
            let protocol = evaluate(
                OsRng,
                &participants,
                *p,
                circuit.clone(),
                my_inputs,
                Arc::clone(&dealer),
            )
            .unwrap();
            protocols.push((*p, Box::new(protocol)));
        }

        run_protocol(protocols)
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    #[test]
    fn test_two_party_difference() {
        let a = Secret::new();
        let b = Secret::new();
        let expr = Expression::from(a) - Expression::from(b);
        let results = run_circuit(expr, vec![(a, 50), (b, 8)], vec![vec![0], vec![1]]);
        assert_eq!(results, vec![42, 42]);
    }

    #[test]
    fn test_constant_only_circuit() {
        let a = Secret::new();
        let expr = Expression::from(a) + Expression::scalar(2) * Expression::scalar(3);
        let results = run_circuit(expr, vec![(a, 4)], vec![vec![0], vec![]]);
        assert_eq!(results, vec![10, 10]);
    }

    #[test]
    fn test_scaling_inside_nested_sum() {
        // The public factor applies to the whole secret-dependent operand,
        // including the constant the designated party carries.
        let a = Secret::new();
        let expr = (Expression::from(a) + Expression::scalar(1)) * Expression::scalar(5);
        let results = run_circuit(expr, vec![(a, 3)], vec![vec![0], vec![]]);
        assert_eq!(results, vec![20, 20]);
    }

    #[test]
    fn test_product_of_sums() {
        let a = Secret::new();
        let b = Secret::new();
        let expr = (Expression::from(a) + Expression::scalar(1))
            * (Expression::from(b) - Expression::scalar(2));
        let results = run_circuit(expr, vec![(a, 4), (b, 9)], vec![vec![0], vec![1]]);
        assert_eq!(results, vec![35, 35]);
    }

    #[test]
    fn test_secret_reused_across_products() {
        let a = Secret::new();
        let b = Secret::new();
        let ea = Expression::from(a);
        let eb = Expression::from(b);
        let expr = ea.clone() * eb.clone() + ea * eb;
        let results = run_circuit(expr, vec![(a, 3), (b, 5)], vec![vec![0], vec![1]]);
        assert_eq!(results, vec![30, 30]);
    }
}
