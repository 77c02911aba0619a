//! Helpers over the pairing groups backing the credential scheme.
//!
//! Everything lives on BLS12-381: G1 for signatures and commitments, G2 for
//! the verification side, and the scalar field Z_p for attributes and proof
//! responses. This module adds the two utilities the rest of the scheme
//! leans on: sampling scalars that are safe to use as exponents, and hashing
//! transcripts into challenge scalars.
use bls12_381::{G1Affine, G2Affine, Scalar};
use digest::Digest;
use ff::Field;
use rand_core::CryptoRngCore;
use sha3::Sha3_512;

/// Sample a nonzero scalar.
///
/// Zero exponents would turn group elements into the identity, which the
/// scheme explicitly rejects, so they are resampled away.
pub(crate) fn random_nonzero_scalar(rng: &mut impl CryptoRngCore) -> Scalar {
    loop {
        let s = Scalar::random(&mut *rng);
        if !bool::from(s.is_zero()) {
            return s;
        }
    }
}

/// Incrementally hashes a transcript into a challenge scalar.
///
/// The digest is SHA3-512 over the concatenation of the canonical encodings
/// fed in, interpreted as a big-endian integer and reduced mod p. The wide
/// digest keeps the reduction bias negligible.
pub(crate) struct ChallengeHasher {
    state: Sha3_512,
}

impl ChallengeHasher {
    pub fn new() -> Self {
        Self {
            state: Sha3_512::new(),
        }
    }

    pub fn absorb_bytes(&mut self, bytes: &[u8]) {
        self.state.update(bytes);
    }

    pub fn absorb_index(&mut self, index: u32) {
        self.state.update(index.to_be_bytes());
    }

    pub fn absorb_scalar(&mut self, scalar: &Scalar) {
        self.state.update(scalar.to_bytes());
    }

    pub fn absorb_g1(&mut self, point: &G1Affine) {
        self.state.update(point.to_compressed());
    }

    pub fn absorb_g2(&mut self, point: &G2Affine) {
        self.state.update(point.to_compressed());
    }

    pub fn finalize(self) -> Scalar {
        let digest = self.state.finalize();
        // The digest is read big-endian; `from_bytes_wide` wants little.
        let mut wide = [0u8; 64];
        for (i, byte) in digest.iter().enumerate() {
            wide[63 - i] = *byte;
        }
        Scalar::from_bytes_wide(&wide)
    }
}

/// Hash arbitrary bytes to a scalar.
///
/// This is how public attribute values are derived from human-readable
/// names, so that both sides of the protocol agree on them without
/// coordination.
pub fn hash_to_scalar(bytes: &[u8]) -> Scalar {
    let mut hasher = ChallengeHasher::new();
    hasher.absorb_bytes(bytes);
    hasher.finalize()
}
