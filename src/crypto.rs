use std::io::Write;

use bls12_381::Scalar;
use ck_meow::Meow;
use serde::{Deserialize, Serialize};

use crate::serde::encode_writer;

const DIGEST_LABEL: &[u8] = b"tdkg v0.1.0 broadcast digest";
const DIGEST_LEN: usize = 32;
const HASH_TO_SCALAR_LABEL: &[u8] = b"tdkg v0.1.0 hash to scalar";

struct MeowWriter<'a>(&'a mut Meow);

impl<'a> Write for MeowWriter<'a> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.ad(buf, true);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A binding digest of some published value.
///
/// The ledger keeps only this for each share broadcast, and checks later
/// disputes against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Digest an arbitrary serializable value.
pub fn digest<T: Serialize>(val: &T) -> Digest {
    let mut meow = Meow::new(DIGEST_LABEL);

    meow.ad(&[], false);
    encode_writer(&mut MeowWriter(&mut meow), val);

    let mut out = [0u8; DIGEST_LEN];
    meow.prf(&mut out, false);

    Digest(out)
}

/// Hash some chunks of data to a scalar, under a domain separation label.
///
/// Each chunk is length prefixed, so chunk boundaries can't be shifted.
pub fn hash_to_scalar(label: &[u8], chunks: &[&[u8]]) -> Scalar {
    let mut meow = Meow::new(HASH_TO_SCALAR_LABEL);

    meow.ad(label, false);
    for chunk in chunks {
        meow.ad(&(chunk.len() as u64).to_be_bytes(), false);
        meow.ad(chunk, false);
    }

    // Reducing 512 bits leaves a negligible bias.
    let mut wide = [0u8; 64];
    meow.prf(&mut wide, false);
    Scalar::from_bytes_wide(&wide)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_digest_binds_value() {
        let a = digest(&(1u32, vec![1u8, 2, 3]));
        assert_eq!(a, digest(&(1u32, vec![1u8, 2, 3])));
        assert_ne!(a, digest(&(1u32, vec![1u8, 2, 4])));
    }

    #[test]
    fn test_hash_to_scalar_separates_chunks() {
        let a = hash_to_scalar(b"label", &[b"ab", b"c"]);
        let b = hash_to_scalar(b"label", &[b"a", b"bc"]);
        let c = hash_to_scalar(b"other", &[b"ab", b"c"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, hash_to_scalar(b"label", &[b"ab", b"c"]));
    }
}
