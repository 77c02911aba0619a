//! Blind issuance of credentials.
//!
//! The user commits to the attributes they want to keep to themselves and
//! proves knowledge of the commitment's opening; the issuer checks the proof,
//! folds in the attributes it vouches for itself, and signs the commitment
//! blindly. Unblinding leaves the user with a plain signature on the union
//! attribute map, which the issuer never saw in full.
use std::collections::BTreeMap;

use bls12_381::{G1Affine, G1Projective, Scalar};
use ff::Field;
use group::Curve;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::bilinear::{random_nonzero_scalar, ChallengeHasher};
use crate::error::Error;
use crate::ps::{self, AttributeMap, PublicKey, SecretKey, Signature};
use crate::serde::{
    deserialize_g1, deserialize_g1_map, deserialize_scalar, deserialize_scalar_map, serialize_g1,
    serialize_g1_map, serialize_scalar, serialize_scalar_map,
};

/// A proof of knowledge of a commitment's opening.
///
/// Schnorr-style: commitments to fresh randomness, a Fiat-Shamir challenge
/// over the whole transcript, and one response per committed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningProof {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    r_t: G1Affine,
    #[serde(
        serialize_with = "serialize_g1_map",
        deserialize_with = "deserialize_g1_map"
    )]
    r_attrs: BTreeMap<u32, G1Affine>,
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    challenge: Scalar,
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    s_t: Scalar,
    #[serde(
        serialize_with = "serialize_scalar_map",
        deserialize_with = "deserialize_scalar_map"
    )]
    s_attrs: BTreeMap<u32, Scalar>,
}

/// What the user sends to the issuer: the commitment and its proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    commitment: G1Affine,
    proof: OpeningProof,
}

/// The user's private state between request and unblinding.
#[derive(Debug, Clone)]
pub struct RequestState {
    t: Scalar,
    attributes: AttributeMap,
}

/// The issuer's blinded signature over commitment and issuer attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignature {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    sigma_1: G1Affine,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    sigma_2: G1Affine,
}

/// A credential: a signature together with the attributes it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub(crate) signature: Signature,
    #[serde(
        serialize_with = "serialize_scalar_map",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub(crate) attributes: AttributeMap,
}

impl Credential {
    /// The attributes this credential certifies.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }
}

fn opening_challenge(
    pk: &PublicKey,
    r_t: &G1Affine,
    r_attrs: &BTreeMap<u32, G1Affine>,
    commitment: &G1Affine,
) -> Scalar {
    let mut hasher = ChallengeHasher::new();
    hasher.absorb_g1(r_t);
    pk.absorb_into(&mut hasher);
    for (&i, r) in r_attrs {
        hasher.absorb_index(i);
        hasher.absorb_g1(r);
    }
    hasher.absorb_g1(commitment);
    hasher.finalize()
}

/// Commit to the user-held attributes and prove knowledge of the opening.
///
/// The returned state must be kept private and fed to [`obtain_credential`]
/// once the issuer responds.
pub fn create_issue_request(
    rng: &mut impl CryptoRngCore,
    pk: &PublicKey,
    user_attributes: &AttributeMap,
) -> Result<(IssueRequest, RequestState), Error> {
    if !pk.covers(user_attributes) {
        return Err(Error::InvalidInput(
            "user attribute index outside the key's slots".to_string(),
        ));
    }

    let t = Scalar::random(&mut *rng);
    let mut commitment = pk.g * t;
    for (&i, a) in user_attributes {
        commitment += pk.y(i) * a;
    }
    let commitment = commitment.to_affine();

    // Blind each committed value with fresh randomness.
    let t_star = Scalar::random(&mut *rng);
    let r_t = (pk.g * t_star).to_affine();
    let a_stars: BTreeMap<u32, Scalar> = user_attributes
        .keys()
        .map(|&i| (i, Scalar::random(&mut *rng)))
        .collect();
    let r_attrs: BTreeMap<u32, G1Affine> = a_stars
        .iter()
        .map(|(&i, a_star)| (i, (pk.y(i) * a_star).to_affine()))
        .collect();

    let challenge = opening_challenge(pk, &r_t, &r_attrs, &commitment);

    let s_t = t_star + challenge * t;
    let s_attrs: BTreeMap<u32, Scalar> = user_attributes
        .iter()
        .map(|(&i, a)| (i, a_stars[&i] + challenge * a))
        .collect();

    let request = IssueRequest {
        commitment,
        proof: OpeningProof {
            r_t,
            r_attrs,
            challenge,
            s_t,
            s_attrs,
        },
    };
    let state = RequestState {
        t,
        attributes: user_attributes.clone(),
    };
    Ok((request, state))
}

fn verify_opening(pk: &PublicKey, request: &IssueRequest) -> Result<(), Error> {
    let proof = &request.proof;
    if !pk.covers(&proof.s_attrs) || proof.s_attrs.keys().ne(proof.r_attrs.keys()) {
        return Err(Error::InvalidInput(
            "malformed opening proof attribute indices".to_string(),
        ));
    }

    let expected = opening_challenge(pk, &proof.r_t, &proof.r_attrs, &request.commitment);
    if !bool::from(expected.ct_eq(&proof.challenge)) {
        return Err(Error::ProofRejected);
    }

    // g^{s_t} * prod Y_i^{s_i} must equal C^c * R_t * prod R_i.
    let mut left = pk.g * proof.s_t;
    for (&i, s) in &proof.s_attrs {
        left += pk.y(i) * s;
    }
    let mut right = request.commitment * proof.challenge + G1Projective::from(proof.r_t);
    for r in proof.r_attrs.values() {
        right += r;
    }
    if left != right {
        return Err(Error::ProofRejected);
    }
    Ok(())
}

/// Check an issuance request and blindly sign it.
///
/// The issuer contributes `issuer_attributes`, whose indices must not
/// collide with the attributes committed by the user.
pub fn sign_issue_request(
    rng: &mut impl CryptoRngCore,
    sk: &SecretKey,
    pk: &PublicKey,
    request: &IssueRequest,
    issuer_attributes: &AttributeMap,
) -> Result<BlindSignature, Error> {
    if !pk.covers(issuer_attributes) {
        return Err(Error::InvalidInput(
            "issuer attribute index outside the key's slots".to_string(),
        ));
    }
    if issuer_attributes
        .keys()
        .any(|i| request.proof.s_attrs.contains_key(i))
    {
        return Err(Error::InvalidInput(
            "issuer attributes collide with committed attributes".to_string(),
        ));
    }

    verify_opening(pk, request)?;

    let u = random_nonzero_scalar(rng);
    let mut base = G1Projective::from(sk.big_x) + request.commitment;
    for (&i, a) in issuer_attributes {
        base += pk.y(i) * a;
    }

    Ok(BlindSignature {
        sigma_1: (pk.g * u).to_affine(),
        sigma_2: (base * u).to_affine(),
    })
}

/// Unblind the issuer's response into a credential.
///
/// The resulting signature covers the union of the user-held and the
/// issuer-known attributes; if it doesn't verify, the response is discarded.
pub fn obtain_credential(
    pk: &PublicKey,
    response: &BlindSignature,
    state: RequestState,
    issuer_attributes: &AttributeMap,
) -> Result<Credential, Error> {
    let mut attributes = state.attributes;
    for (&i, a) in issuer_attributes {
        if attributes.insert(i, *a).is_some() {
            return Err(Error::InvalidInput(format!(
                "issuer reused committed attribute index {}",
                i
            )));
        }
    }

    let signature = Signature {
        h: response.sigma_1,
        s: (G1Projective::from(response.sigma_2) - response.sigma_1 * state.t).to_affine(),
    };

    if !ps::verify(pk, &signature, &attributes) {
        return Err(Error::SignatureInvalid);
    }

    Ok(Credential {
        signature,
        attributes,
    })
}
