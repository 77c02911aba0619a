//! Serialization glue for protocol messages and credential artifacts.
//!
//! Protocol messages are framed with MessagePack. Group elements cross the
//! wire in their canonical compressed form: 48 bytes for G1, 96 bytes for
//! G2, 32 little-endian bytes for scalars. Decoding rejects any byte string
//! that is not the canonical encoding of a group element, so a deserialized
//! artifact is always internally consistent.
use std::collections::BTreeMap;
use std::fmt;

use bls12_381::{G1Affine, G2Affine, Scalar};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Encode an arbitrary serializable value into a vec.
pub fn encode<T: Serialize + ?Sized>(val: &T) -> Vec<u8> {
    rmp_serde::encode::to_vec(val).expect("failed to encode value")
}

/// Encode a value, prefixed with a routing tag.
pub fn encode_with_tag<T: Serialize + ?Sized>(tag: &[u8], val: &T) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len());
    out.extend_from_slice(tag);
    out.append(&mut encode(val));
    out
}

/// Decode a value from a slice of bytes.
pub fn decode<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

struct FixedBytesVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for FixedBytesVisitor<N> {
    type Value = [u8; N];

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} bytes", N)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        v.try_into()
            .map_err(|_| E::invalid_length(v.len(), &self))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = [0u8; N];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(out)
    }
}

macro_rules! encoded_element {
    ($encoded:ident, $elem:ty, $len:expr, $to:ident, $from:ident, $what:expr) => {
        struct $encoded([u8; $len]);

        impl From<&$elem> for $encoded {
            fn from(e: &$elem) -> Self {
                Self(e.$to())
            }
        }

        impl $encoded {
            fn element<E: de::Error>(&self) -> Result<$elem, E> {
                Option::from(<$elem>::$from(&self.0))
                    .ok_or_else(|| E::custom(concat!("invalid ", $what, " encoding")))
            }
        }

        impl Serialize for $encoded {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $encoded {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer
                    .deserialize_bytes(FixedBytesVisitor::<$len>)
                    .map(Self)
            }
        }
    };
}

encoded_element!(EncodedG1, G1Affine, 48, to_compressed, from_compressed, "G1");
encoded_element!(EncodedG2, G2Affine, 96, to_compressed, from_compressed, "G2");
encoded_element!(EncodedScalar, Scalar, 32, to_bytes, from_bytes, "scalar");

macro_rules! element_serde {
    ($elem:ty, $encoded:ident, $single:ident, $de_single:ident,
     $vec:ident, $de_vec:ident) => {
        /// Serialize a single element in compressed form.
        pub fn $single<S: Serializer>(e: &$elem, serializer: S) -> Result<S::Ok, S::Error> {
            $encoded::from(e).serialize(serializer)
        }

        /// Deserialize a single element, rejecting non-canonical encodings.
        pub fn $de_single<'de, D: Deserializer<'de>>(deserializer: D) -> Result<$elem, D::Error> {
            $encoded::deserialize(deserializer)?.element()
        }

        /// Serialize a list of elements in compressed form.
        pub fn $vec<S: Serializer>(es: &[$elem], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(es.iter().map($encoded::from))
        }

        /// Deserialize a list of elements.
        pub fn $de_vec<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<$elem>, D::Error> {
            Vec::<$encoded>::deserialize(deserializer)?
                .iter()
                .map(|e| e.element())
                .collect()
        }
    };
}

macro_rules! element_map_serde {
    ($elem:ty, $encoded:ident, $map:ident, $de_map:ident) => {
        /// Serialize an index-keyed map of elements in compressed form.
        pub fn $map<S: Serializer>(
            es: &BTreeMap<u32, $elem>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_map(es.iter().map(|(i, e)| (i, $encoded::from(e))))
        }

        /// Deserialize an index-keyed map of elements.
        pub fn $de_map<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeMap<u32, $elem>, D::Error> {
            BTreeMap::<u32, $encoded>::deserialize(deserializer)?
                .iter()
                .map(|(i, e)| Ok((*i, e.element()?)))
                .collect()
        }
    };
}

element_serde!(
    G1Affine,
    EncodedG1,
    serialize_g1,
    deserialize_g1,
    serialize_g1_vec,
    deserialize_g1_vec
);
element_serde!(
    G2Affine,
    EncodedG2,
    serialize_g2,
    deserialize_g2,
    serialize_g2_vec,
    deserialize_g2_vec
);
element_serde!(
    Scalar,
    EncodedScalar,
    serialize_scalar,
    deserialize_scalar,
    serialize_scalar_vec,
    deserialize_scalar_vec
);
element_map_serde!(G1Affine, EncodedG1, serialize_g1_map, deserialize_g1_map);
element_map_serde!(Scalar, EncodedScalar, serialize_scalar_map, deserialize_scalar_map);
