use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;

use saunter::{
    evaluate, protocol::run_protocol, protocol::Participant, protocol::Protocol,
    reconstruct_secret, share_secret, Circuit, Expression, Secret, Share, TripleSource,
    TrustedDealer, MODULUS,
};

/// Evaluate an expression jointly, with each party owning one input.
fn run_parties(
    rng: &mut ChaChaRng,
    secrets: &[Secret],
    expr: Expression,
    values: &[u64],
) -> u64 {
    let participants: Vec<Participant> =
        (0..values.len() as u32).map(Participant::from).collect();
    let dealer: Arc<dyn TripleSource> = Arc::new(TrustedDealer::new(&participants).unwrap());
    let circuit = Circuit::new(rng, expr);

    let mut protocols: Vec<(Participant, Box<dyn Protocol<Output = u64>>)> = Vec::new();
    for (i, p) in participants.iter().enumerate() {
        let protocol = evaluate(
            ChaChaRng::from_rng(&mut *rng).unwrap(),
            &participants,
            *p,
            circuit.clone(),
            HashMap::from([(secrets[i], values[i])]),
            Arc::clone(&dealer),
        )
        .unwrap();
        protocols.push((*p, Box::new(protocol)));
    }

    let results = run_protocol(protocols).unwrap();
    let first = results[0].1;
    for (_, r) in &results {
        assert_eq!(*r, first);
    }
    first
}

proptest! {

    #[test]
    fn sharing_reconstructs(
        secret in 0u64..MODULUS,
        num_shares in 1usize..6,
        rng_seed in any::<u64>(),
    ) {
        // Use a deterministic RNG so that test failures can be reproduced.
        let mut rng = ChaChaRng::seed_from_u64(rng_seed);
        let shares = share_secret(&mut rng, secret, num_shares);
        prop_assert_eq!(reconstruct_secret(&shares), secret);
    }

    #[test]
    fn sharing_is_linear(
        x in 0u64..MODULUS,
        y in 0u64..MODULUS,
        k in 0u64..MODULUS,
        rng_seed in any::<u64>(),
    ) {
        let mut rng = ChaChaRng::seed_from_u64(rng_seed);
        let xs = share_secret(&mut rng, x, 4);
        let ys = share_secret(&mut rng, y, 4);

        let sums: Vec<Share> = xs.iter().zip(ys.iter()).map(|(a, b)| a + b).collect();
        prop_assert_eq!(reconstruct_secret(&sums), (x + y) % MODULUS);

        let scaled: Vec<Share> = xs.iter().map(|a| a * k).collect();
        prop_assert_eq!(reconstruct_secret(&scaled), (x * k) % MODULUS);
    }

    #[test]
    fn linear_circuits_match_plaintext(
        a in 0u64..1000,
        b in 0u64..1000,
        c in 0u64..1000,
        k in 0u64..1000,
        rng_seed in any::<u64>(),
    ) {
        let mut rng = ChaChaRng::seed_from_u64(rng_seed);
        let secrets = [Secret::new(), Secret::new(), Secret::new()];
        let expr = Expression::from(secrets[0])
            + Expression::from(secrets[1]) * Expression::scalar(k)
            - Expression::from(secrets[2])
            + Expression::scalar(7);

        let expected = (a + b * k + MODULUS - c + 7) % MODULUS;
        let result = run_parties(&mut rng, &secrets, expr, &[a, b, c]);
        prop_assert_eq!(result, expected);
    }

    #[test]
    fn products_match_plaintext(
        a in 0u64..1000,
        b in 0u64..1000,
        rng_seed in any::<u64>(),
    ) {
        let mut rng = ChaChaRng::seed_from_u64(rng_seed);
        let secrets = [Secret::new(), Secret::new()];
        let expr = Expression::from(secrets[0]) * Expression::from(secrets[1]);

        let result = run_parties(&mut rng, &secrets, expr, &[a, b]);
        prop_assert_eq!(result, (a * b) % MODULUS);
    }
}
