//! Byte encodings for scalars and points.
//!
//! Scalars are 32 byte big endian integers. A G1 point is its two
//! coordinates `(x, y)`, and a G2 point is its four coordinates
//! `(x_i, x, y_i, y)`, each coordinate a big endian field element. The
//! point at infinity is the all zero string, which has to be special-cased
//! before decoding a curve point.
use std::fmt;

use bls12_381::{G1Affine, G2Affine, Scalar};
use serde::{
    de::{self, DeserializeOwned, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;

/// The length of an encoded scalar.
pub const SCALAR_LEN: usize = 32;
/// The length of an encoded G1 point.
pub const G1_LEN: usize = 96;
/// The length of an encoded G2 point.
pub const G2_LEN: usize = 192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("integer of {0} significant bytes does not fit in 256 bits")]
    OversizedInteger(usize),
    #[error("expected {expected} bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("bytes do not encode a valid curve point")]
    InvalidPoint,
}

pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    let mut out = scalar.to_bytes();
    out.reverse();
    out
}

/// Decode a big endian integer as a scalar.
///
/// Leading zero bytes are ignored. Anything wider than 256 bits is rejected,
/// and anything narrower is reduced modulo the group order.
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar, EncodingError> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let significant = &bytes[start..];
    if significant.len() > SCALAR_LEN {
        return Err(EncodingError::OversizedInteger(significant.len()));
    }
    let mut wide = [0u8; 64];
    for (dst, src) in wide.iter_mut().zip(significant.iter().rev()) {
        *dst = *src;
    }
    Ok(Scalar::from_bytes_wide(&wide))
}

pub fn g1_to_bytes(point: &G1Affine) -> [u8; G1_LEN] {
    if bool::from(point.is_identity()) {
        return [0u8; G1_LEN];
    }
    point.to_uncompressed()
}

pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Affine, EncodingError> {
    let bytes: &[u8; G1_LEN] = bytes.try_into().map_err(|_| EncodingError::InvalidLength {
        expected: G1_LEN,
        found: bytes.len(),
    })?;
    if bytes.iter().all(|&b| b == 0) {
        return Ok(G1Affine::identity());
    }
    Option::from(G1Affine::from_uncompressed(bytes)).ok_or(EncodingError::InvalidPoint)
}

pub fn g2_to_bytes(point: &G2Affine) -> [u8; G2_LEN] {
    if bool::from(point.is_identity()) {
        return [0u8; G2_LEN];
    }
    point.to_uncompressed()
}

pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine, EncodingError> {
    let bytes: &[u8; G2_LEN] = bytes.try_into().map_err(|_| EncodingError::InvalidLength {
        expected: G2_LEN,
        found: bytes.len(),
    })?;
    if bytes.iter().all(|&b| b == 0) {
        return Ok(G2Affine::identity());
    }
    Option::from(G2Affine::from_uncompressed(bytes)).ok_or(EncodingError::InvalidPoint)
}

/// Encode an arbitrary serializable value into a vec.
pub fn encode<T: Serialize + ?Sized>(val: &T) -> Vec<u8> {
    rmp_serde::encode::to_vec(val).expect("failed to encode value")
}

/// Encode an arbitrary serializable value with a writer.
pub fn encode_writer<T: Serialize + ?Sized, W: std::io::Write>(w: &mut W, val: &T) {
    rmp_serde::encode::write(w, val).expect("failed to encode value");
}

/// Decode an arbitrary value from some bytes.
pub fn decode<T: DeserializeOwned>(input: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(input)
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            out.push(b);
        }
        Ok(out)
    }
}

fn deserialize_raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    deserializer.deserialize_bytes(BytesVisitor)
}

/// A scalar, serialized through its wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SerializableScalar(pub Scalar);

impl Serialize for SerializableScalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&scalar_to_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for SerializableScalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = deserialize_raw(deserializer)?;
        scalar_from_bytes(&raw)
            .map(Self)
            .map_err(de::Error::custom)
    }
}

/// A G1 point, serialized through its wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SerializableG1(pub G1Affine);

impl Serialize for SerializableG1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&g1_to_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for SerializableG1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = deserialize_raw(deserializer)?;
        g1_from_bytes(&raw).map(Self).map_err(de::Error::custom)
    }
}

/// A G2 point, serialized through its wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SerializableG2(pub G2Affine);

impl Serialize for SerializableG2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&g2_to_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for SerializableG2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = deserialize_raw(deserializer)?;
        g2_from_bytes(&raw).map(Self).map_err(de::Error::custom)
    }
}

pub fn serialize_scalar<S: Serializer>(data: &Scalar, serializer: S) -> Result<S::Ok, S::Error> {
    SerializableScalar(*data).serialize(serializer)
}

pub fn deserialize_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Scalar, D::Error> {
    SerializableScalar::deserialize(deserializer).map(|s| s.0)
}

/// Serialize a list of scalars.
pub fn serialize_scalars<S: Serializer>(data: &[Scalar], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(data.iter().copied().map(SerializableScalar))
}

pub fn deserialize_scalars<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Scalar>, D::Error> {
    let raw: Vec<SerializableScalar> = Deserialize::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|s| s.0).collect())
}

pub fn serialize_g1<S: Serializer>(data: &G1Affine, serializer: S) -> Result<S::Ok, S::Error> {
    SerializableG1(*data).serialize(serializer)
}

pub fn deserialize_g1<'de, D: Deserializer<'de>>(deserializer: D) -> Result<G1Affine, D::Error> {
    SerializableG1::deserialize(deserializer).map(|p| p.0)
}

pub fn serialize_g2<S: Serializer>(data: &G2Affine, serializer: S) -> Result<S::Ok, S::Error> {
    SerializableG2(*data).serialize(serializer)
}

pub fn deserialize_g2<'de, D: Deserializer<'de>>(deserializer: D) -> Result<G2Affine, D::Error> {
    SerializableG2::deserialize(deserializer).map(|p| p.0)
}

#[cfg(test)]
mod test {
    use bls12_381::{G1Projective, G2Projective};
    use ff::Field;
    use group::Curve;

    use super::*;

    #[test]
    fn test_scalar_is_big_endian() {
        let bytes = scalar_to_bytes(&Scalar::from(0x0102u64));
        assert_eq!(bytes[30..], [0x01, 0x02]);
        assert!(bytes[..30].iter().all(|&b| b == 0));
        assert_eq!(scalar_from_bytes(&[0x01, 0x02]).unwrap(), Scalar::from(0x0102u64));
    }

    #[test]
    fn test_oversized_scalar_is_rejected() {
        let mut bytes = [0u8; 33];
        bytes[0] = 1;
        assert_eq!(
            scalar_from_bytes(&bytes),
            Err(EncodingError::OversizedInteger(33))
        );
        // Leading zeros don't count towards the width.
        let mut padded = [0u8; 40];
        padded[39] = 5;
        assert_eq!(scalar_from_bytes(&padded).unwrap(), Scalar::from(5u64));
    }

    #[test]
    fn test_scalar_at_least_order_is_reduced() {
        // r - 1 ends in a zero byte, so bumping it gives r itself.
        let mut r = scalar_to_bytes(&(-Scalar::ONE));
        r[31] += 1;
        assert_eq!(scalar_from_bytes(&r).unwrap(), Scalar::ZERO);
        assert_eq!(scalar_from_bytes(&[0xff; 32]).unwrap(), {
            let mut wide = [0u8; 64];
            wide[..32].copy_from_slice(&[0xff; 32]);
            Scalar::from_bytes_wide(&wide)
        });
    }

    #[test]
    fn test_identity_is_zero_bytes() {
        assert_eq!(g1_to_bytes(&G1Affine::identity()), [0u8; G1_LEN]);
        assert_eq!(g2_to_bytes(&G2Affine::identity()), [0u8; G2_LEN]);
        assert_eq!(g1_from_bytes(&[0u8; G1_LEN]).unwrap(), G1Affine::identity());
        assert_eq!(g2_from_bytes(&[0u8; G2_LEN]).unwrap(), G2Affine::identity());
    }

    #[test]
    fn test_points_decode() {
        let p = (G1Projective::generator() * Scalar::from(9u64)).to_affine();
        assert_eq!(g1_from_bytes(&g1_to_bytes(&p)).unwrap(), p);
        let q = (G2Projective::generator() * Scalar::from(9u64)).to_affine();
        assert_eq!(g2_from_bytes(&g2_to_bytes(&q)).unwrap(), q);
    }

    #[test]
    fn test_bad_points_are_rejected() {
        assert_eq!(
            g1_from_bytes(&[0u8; 10]),
            Err(EncodingError::InvalidLength {
                expected: G1_LEN,
                found: 10
            })
        );
        let mut off_curve = g1_to_bytes(&G1Affine::generator());
        off_curve[G1_LEN - 1] ^= 1;
        assert_eq!(g1_from_bytes(&off_curve), Err(EncodingError::InvalidPoint));
    }
}
