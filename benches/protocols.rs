use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand_core::OsRng;

use saunter::{
    create_disclosure_proof, create_issue_request, evaluate, keygen, obtain_credential,
    protocol::{run_protocol, Participant, Protocol},
    sign, sign_issue_request, verify, verify_disclosure_proof, AttributeMap, Circuit, Credential,
    Expression, PublicKey, Secret, TripleSource, TrustedDealer,
};

fn run_pairwise_products(participants: &[Participant]) -> Vec<(Participant, u64)> {
    let secrets: Vec<Secret> = participants.iter().map(|_| Secret::new()).collect();
    let exprs: Vec<Expression> = secrets.iter().map(|&s| Expression::from(s)).collect();
    let mut expr = exprs[0].clone() * exprs[1].clone();
    for i in 1..exprs.len() {
        let j = (i + 1) % exprs.len();
        expr = expr + exprs[i].clone() * exprs[j].clone();
    }

    let dealer: Arc<dyn TripleSource> = Arc::new(TrustedDealer::new(participants).unwrap());
    let circuit = Circuit::new(&mut OsRng, expr);

    let mut protocols: Vec<(Participant, Box<dyn Protocol<Output = u64>>)> =
        Vec::with_capacity(participants.len());
    for (i, p) in participants.iter().enumerate() {
        let protocol = evaluate(
            OsRng,
            participants,
            *p,
            circuit.clone(),
            HashMap::from([(secrets[i], i as u64 + 3)]),
            Arc::clone(&dealer),
        )
        .unwrap();
        protocols.push((*p, Box::new(protocol)));
    }

    run_protocol(protocols).unwrap()
}

fn issue(pk: &PublicKey, sk: &saunter::SecretKey) -> Credential {
    let user: AttributeMap = [(0, saunter::hash_to_scalar(b"user secret"))]
        .into_iter()
        .collect();
    let issuer: AttributeMap = (1..4u32)
        .map(|i| (i, saunter::hash_to_scalar(&i.to_be_bytes())))
        .collect();
    let (request, state) = create_issue_request(&mut OsRng, pk, &user).unwrap();
    let response = sign_issue_request(&mut OsRng, sk, pk, &request, &issuer).unwrap();
    obtain_credential(pk, &response, state, &issuer).unwrap()
}

fn bench_mpc(c: &mut Criterion) {
    let participants: Vec<Participant> = (0u32..3).map(Participant::from).collect();
    c.bench_function("evaluate pairwise products (3 parties)", |b| {
        b.iter(|| black_box(run_pairwise_products(&participants)))
    });
}

fn bench_credentials(c: &mut Criterion) {
    let (sk, pk) = keygen(&mut OsRng, 4);
    let attributes: AttributeMap = (0..4u32)
        .map(|i| (i, bls_scalar(i as u64 + 1)))
        .collect();

    c.bench_function("ps sign", |b| {
        b.iter(|| black_box(sign(&mut OsRng, &sk, &attributes).unwrap()))
    });

    let signature = sign(&mut OsRng, &sk, &attributes).unwrap();
    c.bench_function("ps verify", |b| {
        b.iter(|| black_box(verify(&pk, &signature, &attributes)))
    });

    c.bench_function("issuance round trip", |b| b.iter(|| black_box(issue(&pk, &sk))));

    let credential = issue(&pk, &sk);
    let hidden: BTreeSet<u32> = [0].into_iter().collect();
    c.bench_function("create showing", |b| {
        b.iter(|| {
            black_box(
                create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"46.5,6.6")
                    .unwrap(),
            )
        })
    });

    let proof = create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"46.5,6.6").unwrap();
    c.bench_function("verify showing", |b| {
        b.iter(|| black_box(verify_disclosure_proof(&pk, &proof, b"46.5,6.6").unwrap()))
    });
}

fn bls_scalar(v: u64) -> saunter::Attribute {
    saunter::Attribute::from(v)
}

criterion_group!(benches, bench_mpc, bench_credentials);
criterion_main!(benches);
