//! Bincode transaction codec.

use crate::domain::Tx;
use crate::error::{Result, TxError};
use crate::ports::TxDecoder;

/// Encodes and decodes transactions with bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeTxCodec;

impl BincodeTxCodec {
    pub fn encode(&self, tx: &Tx) -> Result<Vec<u8>> {
        bincode::serialize(tx).map_err(|e| TxError::Internal(e.to_string()))
    }
}

impl TxDecoder for BincodeTxCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Tx> {
        if bytes.is_empty() {
            return Err(TxError::Decode("empty tx bytes".into()));
        }
        bincode::deserialize(bytes).map_err(|e| TxError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Msg;

    #[test]
    fn test_decode_encoded_tx() {
        let tx = Tx {
            msgs: vec![Msg::new("bank", "send", vec![[1; 20]], vec![1, 2, 3])],
            memo: "hello".into(),
            ..Default::default()
        };
        let bytes = BincodeTxCodec.encode(&tx).unwrap();
        assert_eq!(BincodeTxCodec.decode(&bytes).unwrap(), tx);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            BincodeTxCodec.decode(&[0xff, 0x01]),
            Err(TxError::Decode(_))
        ));
        assert!(matches!(BincodeTxCodec.decode(&[]), Err(TxError::Decode(_))));
    }
}
