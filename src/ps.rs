//! The Pointcheval-Sanders signature scheme over attribute vectors.
//!
//! A key is generated for a fixed number of attribute slots L. Signatures
//! are over maps from slot index to attribute scalar; slots absent from a
//! map simply don't contribute. Two properties make the scheme the right
//! base for anonymous credentials: a signature can be re-randomized into an
//! unlinkable one on the same attributes, and the issuance protocol can sign
//! a commitment without seeing the committed attribute.
use std::collections::BTreeMap;

use bls12_381::{pairing, G1Affine, G2Affine, G2Projective, Scalar};
use group::Curve;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::bilinear::{random_nonzero_scalar, ChallengeHasher};
use crate::error::Error;
use crate::serde::{
    deserialize_g1, deserialize_g1_vec, deserialize_g2, deserialize_g2_vec, deserialize_scalar,
    deserialize_scalar_vec, serialize_g1, serialize_g1_vec, serialize_g2, serialize_g2_vec,
    serialize_scalar, serialize_scalar_vec,
};

/// An attribute value: an element of the scalar field.
pub type Attribute = Scalar;

/// Attributes keyed by their slot index.
///
/// The ordered map gives every holder the same iteration order, which is
/// what transcript hashing relies on.
pub type AttributeMap = BTreeMap<u32, Attribute>;

/// The signer's secret key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKey {
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    pub(crate) x: Scalar,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) big_x: G1Affine,
    #[serde(
        serialize_with = "serialize_scalar_vec",
        deserialize_with = "deserialize_scalar_vec"
    )]
    pub(crate) ys: Vec<Scalar>,
}

/// The public verification key, covering L attribute slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) g: G1Affine,
    #[serde(
        serialize_with = "serialize_g1_vec",
        deserialize_with = "deserialize_g1_vec"
    )]
    pub(crate) ys: Vec<G1Affine>,
    #[serde(serialize_with = "serialize_g2", deserialize_with = "deserialize_g2")]
    pub(crate) g_hat: G2Affine,
    #[serde(serialize_with = "serialize_g2", deserialize_with = "deserialize_g2")]
    pub(crate) x_hat: G2Affine,
    #[serde(
        serialize_with = "serialize_g2_vec",
        deserialize_with = "deserialize_g2_vec"
    )]
    pub(crate) ys_hat: Vec<G2Affine>,
}

impl PublicKey {
    /// The number of attribute slots this key covers.
    pub fn attribute_count(&self) -> usize {
        self.ys.len()
    }

    /// Whether every index in a map addresses a slot of this key.
    pub(crate) fn covers(&self, attributes: &AttributeMap) -> bool {
        attributes
            .keys()
            .all(|&i| (i as usize) < self.attribute_count())
    }

    /// The G1 base for an attribute slot.
    pub(crate) fn y(&self, index: u32) -> &G1Affine {
        &self.ys[index as usize]
    }

    /// The G2 base for an attribute slot.
    pub(crate) fn y_hat(&self, index: u32) -> &G2Affine {
        &self.ys_hat[index as usize]
    }

    /// Feed the whole key into a challenge transcript.
    pub(crate) fn absorb_into(&self, hasher: &mut ChallengeHasher) {
        hasher.absorb_g1(&self.g);
        for (i, y) in self.ys.iter().enumerate() {
            hasher.absorb_index(i as u32);
            hasher.absorb_g1(y);
        }
        hasher.absorb_g2(&self.g_hat);
        hasher.absorb_g2(&self.x_hat);
        for (i, y_hat) in self.ys_hat.iter().enumerate() {
            hasher.absorb_index(i as u32);
            hasher.absorb_g2(y_hat);
        }
    }
}

/// A signature on a vector of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) h: G1Affine,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub(crate) s: G1Affine,
}

/// Generate a fresh key pair covering a number of attribute slots.
pub fn keygen(rng: &mut impl CryptoRngCore, attribute_count: usize) -> (SecretKey, PublicKey) {
    let g = G1Affine::generator();
    let g_hat = G2Affine::generator();

    let x = random_nonzero_scalar(rng);
    let ys: Vec<Scalar> = (0..attribute_count)
        .map(|_| random_nonzero_scalar(rng))
        .collect();

    let sk = SecretKey {
        x,
        big_x: (g * x).to_affine(),
        ys: ys.clone(),
    };
    let pk = PublicKey {
        g,
        ys: ys.iter().map(|y| (g * y).to_affine()).collect(),
        g_hat,
        x_hat: (g_hat * x).to_affine(),
        ys_hat: ys.iter().map(|y| (g_hat * y).to_affine()).collect(),
    };
    (sk, pk)
}

/// Sign a map of attributes.
///
/// The base point is drawn fresh per signature; indices outside the key's
/// range are rejected.
pub fn sign(
    rng: &mut impl CryptoRngCore,
    sk: &SecretKey,
    attributes: &AttributeMap,
) -> Result<Signature, Error> {
    if let Some(&index) = attributes
        .keys()
        .find(|&&i| (i as usize) >= sk.ys.len())
    {
        return Err(Error::InvalidInput(format!(
            "attribute index {} outside the key's {} slots",
            index,
            sk.ys.len()
        )));
    }

    let h = G1Affine::generator() * random_nonzero_scalar(rng);

    let mut exponent = sk.x;
    for (&i, m) in attributes {
        exponent += sk.ys[i as usize] * m;
    }

    Ok(Signature {
        h: h.to_affine(),
        s: (h * exponent).to_affine(),
    })
}

/// Verify a signature on a map of attributes.
#[must_use]
pub fn verify(pk: &PublicKey, signature: &Signature, attributes: &AttributeMap) -> bool {
    if bool::from(signature.h.is_identity()) || !pk.covers(attributes) {
        return false;
    }

    let mut rhs = G2Projective::from(pk.x_hat);
    for (&i, m) in attributes {
        rhs += pk.y_hat(i) * m;
    }

    let left = pairing(&signature.h, &rhs.to_affine());
    let right = pairing(&signature.s, &pk.g_hat);
    bool::from(left.ct_eq(&right))
}
