//! Unlinkable selective disclosure of credentials.
//!
//! A showing re-randomizes the credential's signature, reveals a chosen
//! subset of attributes, and proves knowledge of the hidden ones. The
//! request message is hashed into the proof's challenge, so a valid showing
//! also authenticates that message: it cannot be replayed for a different
//! request, and the proof cannot be grafted onto another showing.
use std::collections::{BTreeMap, BTreeSet};

use bls12_381::{pairing, G1Affine, G2Affine, Scalar};
use ff::Field;
use group::Curve;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::bilinear::{random_nonzero_scalar, ChallengeHasher};
use crate::error::Error;
use crate::issuance::Credential;
use crate::ps::{AttributeMap, PublicKey};
use crate::serde::{
    deserialize_g1, deserialize_g1_map, deserialize_g2, deserialize_scalar,
    deserialize_scalar_map, serialize_g1, serialize_g1_map, serialize_g2, serialize_scalar,
    serialize_scalar_map,
};

/// A showing: a randomized signature, the disclosed attributes, and a proof
/// of knowledge of everything that stays hidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureProof {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) sigma_1: G1Affine,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) sigma_2: G1Affine,
    #[serde(
        serialize_with = "serialize_scalar_map",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub(crate) disclosed: AttributeMap,
    #[serde(serialize_with = "serialize_g2", deserialize_with = "deserialize_g2")]
    pub(crate) r_t_hat: G2Affine,
    #[serde(
        serialize_with = "serialize_g1_map",
        deserialize_with = "deserialize_g1_map"
    )]
    pub(crate) r_attrs: BTreeMap<u32, G1Affine>,
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    pub(crate) challenge: Scalar,
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    pub(crate) s_t: Scalar,
    #[serde(
        serialize_with = "serialize_scalar_map",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub(crate) s_attrs: BTreeMap<u32, Scalar>,
}

impl DisclosureProof {
    /// The attributes this showing reveals.
    pub fn disclosed(&self) -> &AttributeMap {
        &self.disclosed
    }
}

/// The full transcript goes into the challenge; omitting any term would
/// open the door to mix-and-match forgeries.
fn disclosure_challenge(
    pk: &PublicKey,
    r_t_hat: &G2Affine,
    r_attrs: &BTreeMap<u32, G1Affine>,
    disclosed: &AttributeMap,
    sigma_1: &G1Affine,
    sigma_2: &G1Affine,
    message: &[u8],
) -> Scalar {
    let mut hasher = ChallengeHasher::new();
    hasher.absorb_g2(r_t_hat);
    pk.absorb_into(&mut hasher);
    for (&i, r) in r_attrs {
        hasher.absorb_index(i);
        hasher.absorb_g1(r);
    }
    for (&i, a) in disclosed {
        hasher.absorb_index(i);
        hasher.absorb_scalar(a);
    }
    hasher.absorb_g1(sigma_1);
    hasher.absorb_g1(sigma_2);
    hasher.absorb_bytes(message);
    hasher.finalize()
}

/// Show a credential, revealing every attribute not in `hidden` and binding
/// the showing to a request message.
pub fn create_disclosure_proof(
    rng: &mut impl CryptoRngCore,
    pk: &PublicKey,
    credential: &Credential,
    hidden: &BTreeSet<u32>,
    message: &[u8],
) -> Result<DisclosureProof, Error> {
    if let Some(&index) = hidden
        .iter()
        .find(|&&i| !credential.attributes.contains_key(&i))
    {
        return Err(Error::InvalidInput(format!(
            "cannot hide attribute {} the credential does not carry",
            index
        )));
    }
    if bool::from(credential.signature.h.is_identity()) {
        return Err(Error::SignatureInvalid);
    }

    // Randomize the signature; a fresh nonzero exponent makes this showing
    // unlinkable to the credential and to any other showing.
    let r = random_nonzero_scalar(rng);
    let t = Scalar::random(&mut *rng);
    let sigma_1 = (credential.signature.h * r).to_affine();
    let sigma_2 = ((credential.signature.h * t + credential.signature.s) * r).to_affine();

    let disclosed: AttributeMap = credential
        .attributes
        .iter()
        .filter(|(i, _)| !hidden.contains(*i))
        .map(|(&i, a)| (i, *a))
        .collect();

    let t_star = Scalar::random(&mut *rng);
    let r_t_hat = (pk.g_hat * t_star).to_affine();
    let a_stars: BTreeMap<u32, Scalar> = hidden
        .iter()
        .map(|&i| (i, Scalar::random(&mut *rng)))
        .collect();
    let r_attrs: BTreeMap<u32, G1Affine> = a_stars
        .iter()
        .map(|(&i, a_star)| (i, (sigma_1 * a_star).to_affine()))
        .collect();

    let challenge =
        disclosure_challenge(pk, &r_t_hat, &r_attrs, &disclosed, &sigma_1, &sigma_2, message);

    let s_t = challenge * t + t_star;
    let s_attrs: BTreeMap<u32, Scalar> = hidden
        .iter()
        .map(|&i| (i, challenge * credential.attributes[&i] + a_stars[&i]))
        .collect();

    Ok(DisclosureProof {
        sigma_1,
        sigma_2,
        disclosed,
        r_t_hat,
        r_attrs,
        challenge,
        s_t,
        s_attrs,
    })
}

/// Verify a showing against a request message.
pub fn verify_disclosure_proof(
    pk: &PublicKey,
    proof: &DisclosureProof,
    message: &[u8],
) -> Result<(), Error> {
    if bool::from(proof.sigma_1.is_identity()) {
        return Err(Error::SignatureInvalid);
    }
    if !pk.covers(&proof.disclosed) || !pk.covers(&proof.s_attrs) {
        return Err(Error::InvalidInput(
            "attribute index outside the key's slots".to_string(),
        ));
    }
    if proof.s_attrs.keys().ne(proof.r_attrs.keys())
        || proof.s_attrs.keys().any(|i| proof.disclosed.contains_key(i))
    {
        return Err(Error::InvalidInput(
            "malformed disclosure proof attribute indices".to_string(),
        ));
    }

    let expected = disclosure_challenge(
        pk,
        &proof.r_t_hat,
        &proof.r_attrs,
        &proof.disclosed,
        &proof.sigma_1,
        &proof.sigma_2,
        message,
    );
    if !bool::from(expected.ct_eq(&proof.challenge)) {
        return Err(Error::ProofRejected);
    }

    // The Schnorr responses must account for sigma_2's exponent: folding the
    // disclosed attributes and X into the challenge side, the pairing of
    // sigma_1 against the combined G2 term plus the hidden-attribute
    // pairings must match c times the pairing of sigma_2 against g-hat.
    let c = proof.challenge;
    let mut combined = pk.g_hat * proof.s_t - proof.r_t_hat + pk.x_hat * c;
    for (&i, a) in &proof.disclosed {
        combined += pk.y_hat(i) * (a * c);
    }

    let mut left = pairing(&proof.sigma_1, &combined.to_affine());
    for (&i, s) in &proof.s_attrs {
        let opening = (proof.sigma_1 * s - proof.r_attrs[&i]).to_affine();
        left += pairing(&opening, pk.y_hat(i));
    }

    let right = pairing(&proof.sigma_2, &pk.g_hat) * c;
    if !bool::from(left.ct_eq(&right)) {
        return Err(Error::ProofRejected);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::issuance::{create_issue_request, obtain_credential, sign_issue_request};
    use crate::ps::keygen;
    use crate::ps::SecretKey;

    fn issue_credential() -> (SecretKey, PublicKey, Credential) {
        let (sk, pk) = keygen(&mut OsRng, 3);
        let user: AttributeMap = [(0, Scalar::random(&mut OsRng))].into_iter().collect();
        let issuer: AttributeMap = [(1, Scalar::from(11u64)), (2, Scalar::from(22u64))]
            .into_iter()
            .collect();
        let (request, state) = create_issue_request(&mut OsRng, &pk, &user).unwrap();
        let response = sign_issue_request(&mut OsRng, &sk, &pk, &request, &issuer).unwrap();
        let credential = obtain_credential(&pk, &response, state, &issuer).unwrap();
        (sk, pk, credential)
    }

    #[test]
    fn test_showing_round_trip() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [0].into_iter().collect();
        let proof =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"46.5,6.6").unwrap();

        assert_eq!(proof.disclosed().len(), 2);
        assert_eq!(verify_disclosure_proof(&pk, &proof, b"46.5,6.6"), Ok(()));
    }

    #[test]
    fn test_hiding_everything_still_verifies() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [0, 1, 2].into_iter().collect();
        let proof =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"m").unwrap();
        assert!(proof.disclosed().is_empty());
        assert_eq!(verify_disclosure_proof(&pk, &proof, b"m"), Ok(()));
    }

    #[test]
    fn test_message_is_bound() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [0].into_iter().collect();
        let proof =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"46.5,6.6").unwrap();
        assert_eq!(
            verify_disclosure_proof(&pk, &proof, b"46.5,6.7"),
            Err(Error::ProofRejected)
        );
    }

    #[test]
    fn test_tampered_components_are_rejected() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [0].into_iter().collect();
        let proof =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"m").unwrap();

        let mut changed_attribute = proof.clone();
        changed_attribute
            .disclosed
            .insert(1, Scalar::from(99u64));
        assert!(verify_disclosure_proof(&pk, &changed_attribute, b"m").is_err());

        let mut swapped_signature = proof.clone();
        swapped_signature.sigma_2 = proof.sigma_1;
        assert!(verify_disclosure_proof(&pk, &swapped_signature, b"m").is_err());

        let mut bumped_response = proof.clone();
        bumped_response.s_t += Scalar::from(1u64);
        assert!(verify_disclosure_proof(&pk, &bumped_response, b"m").is_err());

        let mut identity_base = proof;
        identity_base.sigma_1 = G1Affine::identity();
        assert_eq!(
            verify_disclosure_proof(&pk, &identity_base, b"m"),
            Err(Error::SignatureInvalid)
        );
    }

    #[test]
    fn test_showings_are_unlinkable() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [0].into_iter().collect();
        let first =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"m").unwrap();
        let second =
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"m").unwrap();

        // Fresh randomization every time: the signature components never
        // repeat, and never equal the credential's own signature.
        assert_ne!(first.sigma_1, second.sigma_1);
        assert_ne!(first.sigma_1, credential.signature.h);
        assert!(!bool::from(first.sigma_1.is_identity()));
        assert_eq!(verify_disclosure_proof(&pk, &first, b"m"), Ok(()));
        assert_eq!(verify_disclosure_proof(&pk, &second, b"m"), Ok(()));
    }

    #[test]
    fn test_hiding_unknown_attribute_is_rejected() {
        let (_, pk, credential) = issue_credential();
        let hidden: BTreeSet<u32> = [7].into_iter().collect();
        assert!(matches!(
            create_disclosure_proof(&mut OsRng, &pk, &credential, &hidden, b"m"),
            Err(Error::InvalidInput(_))
        ));
    }
}
