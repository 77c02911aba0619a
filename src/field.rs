//! Arithmetic in the small field used by the MPC engine.
//!
//! All secret values live in Z_Q for a fixed power-of-two modulus Q, so that
//! reduction is a single bitmask. Shares are just residues, and an n-of-n
//! additive sharing of a secret is any vector of n residues summing to it.
use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

/// The number of bits in the modulus.
pub const MODULUS_BITS: u32 = 20;

/// The modulus Q itself.
///
/// Circuit results and every intermediate product must stay well below this
/// value, otherwise they wrap into an unintended residue.
pub const MODULUS: u64 = 1 << MODULUS_BITS;

const MASK: u64 = MODULUS - 1;

/// A single additive share, i.e. a residue in [0, Q).
///
/// Shares are closed under addition, subtraction, and multiplication mod Q,
/// and can be scaled by a public integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Share(u64);

impl Share {
    /// The additive identity.
    pub const ZERO: Share = Share(0);

    /// Create a share from an arbitrary integer, reducing it mod Q.
    pub fn from_residue(value: u64) -> Self {
        Share(value & MASK)
    }

    /// The residue held by this share.
    pub fn residue(&self) -> u64 {
        self.0
    }

    /// Sample a uniformly random share.
    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        // Q is a power of two, so masking preserves uniformity.
        Share(rng.next_u64() & MASK)
    }

    fn add(&self, other: &Share) -> Share {
        Share((self.0 + other.0) & MASK)
    }

    fn sub(&self, other: &Share) -> Share {
        Share((self.0 + MODULUS - other.0) & MASK)
    }

    fn mul(&self, other: &Share) -> Share {
        // Both residues are < 2^20, so the product fits in a u64.
        Share((self.0 * other.0) & MASK)
    }

    fn scale(&self, factor: u64) -> Share {
        Share((self.0 * (factor & MASK)) & MASK)
    }
}

impl_op_ex!(+ |a: &Share, b: &Share| -> Share { a.add(b) });
impl_op_ex!(+= |a: &mut Share, b: &Share| { *a = a.add(b) });
impl_op_ex!(-|a: &Share, b: &Share| -> Share { a.sub(b) });
impl_op_ex!(-= |a: &mut Share, b: &Share| { *a = a.sub(b) });
impl_op_ex!(*|a: &Share, b: &Share| -> Share { a.mul(b) });
impl_op_ex_commutative!(*|a: &Share, k: &u64| -> Share { a.scale(*k) });

/// Split a secret into an n-of-n additive sharing.
///
/// All shares but the first are uniformly random, which makes the sharing
/// perfectly hiding against any n - 1 of the holders.
pub fn share_secret(rng: &mut impl CryptoRngCore, secret: u64, num_shares: usize) -> Vec<Share> {
    assert!(num_shares > 0, "cannot share a secret among zero parties");
    let mut shares = Vec::with_capacity(num_shares);
    shares.push(Share::ZERO);
    let mut sum = Share::ZERO;
    for _ in 1..num_shares {
        let s = Share::random(rng);
        sum += s;
        shares.push(s);
    }
    shares[0] = Share::from_residue(secret) - sum;
    shares
}

/// Recombine an additive sharing into the secret it hides.
pub fn reconstruct_secret(shares: &[Share]) -> u64 {
    shares.iter().fold(Share::ZERO, |acc, s| acc + s).residue()
}
