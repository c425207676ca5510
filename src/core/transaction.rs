// Transactions are the only thing a block carries. Each one is an immutable record
// of a value transfer or a file operation, hashed once when I build it.
// A transaction is either unsigned or carries exactly one signature from its sender.

use crate::core::Signature;
use crate::error::{ChainError, Result};
use crate::utils::{deserialize, encode, serialize, sha3_digest};
use serde::{Deserialize, Serialize};

/// Sender recorded on genesis allocations, which have no signing account behind them.
pub const GENESIS_SENDER: &[u8] = &[];

/// Account nonce recorded on genesis allocations.
pub const GENESIS_ACCOUNT_NONCE: i64 = -1;

/// Value credited to a miner's coinbase by a reward transaction.
pub const BLOCK_REWARD: f64 = 50.0;

/// What a transaction does to chain state, stored by discriminant on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum Operation {
    /// Add a file; payload is the hash of the file name
    AddFile,
    /// Remove a file
    RemoveFile,
    /// Edit a file
    EditFile,
    /// Plain value transfer (genesis allocations and block rewards)
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    account_nonce: i64,         // Index of this transaction in the sender's history
    sender: Vec<u8>,            // Sender public key (uncompressed secp256k1)
    recipient: Vec<u8>,         // Recipient public key
    value: f64,                 // Amount moved
    operation: Operation,       // State mutation to apply
    payload: Vec<u8>,           // Operation argument
    signature: Option<Signature>,
    hash: Vec<u8>,              // Hash of the unsigned fields, fixed at construction
}

impl Transaction {
    // When I create a new transaction, I hash the unsigned fields right away
    pub fn new(
        account_nonce: i64,
        sender: &[u8],
        recipient: &[u8],
        value: f64,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Transaction> {
        if !value.is_finite() {
            return Err(ChainError::Transaction(
                "Transaction value must be finite".to_string(),
            ));
        }

        let mut tx = Transaction {
            account_nonce,
            sender: sender.to_vec(),
            recipient: recipient.to_vec(),
            value,
            operation,
            payload: payload.to_vec(),
            signature: None,
            hash: vec![],
        };
        tx.hash = sha3_digest(tx.unsigned_bytes()?.as_slice());
        Ok(tx)
    }

    // Genesis allocations credit a recipient out of thin air
    pub fn new_allocation(recipient: &[u8], amount: f64) -> Result<Transaction> {
        Self::new(
            GENESIS_ACCOUNT_NONCE,
            GENESIS_SENDER,
            recipient,
            amount,
            Operation::Transfer,
            &[],
        )
    }

    // Reward paid to whoever mined the block
    pub fn new_reward(coinbase: &[u8]) -> Result<Transaction> {
        Self::new(0, GENESIS_SENDER, coinbase, BLOCK_REWARD, Operation::Transfer, &[])
    }

    /// Canonical encoding of every field except the signature and the hash.
    /// This is both the hash preimage and the signing message.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        encode(&(
            self.account_nonce,
            &self.sender,
            &self.recipient,
            self.value,
            self.operation,
            &self.payload,
        ))
    }

    // I only allow one signature, and only from the key that owns the sender field
    pub fn sign(&mut self, secret_key: &[u8]) -> Result<()> {
        if self.signature.is_some() {
            return Err(ChainError::Transaction(
                "Transaction is already signed".to_string(),
            ));
        }

        let message = self.unsigned_bytes()?;
        let signature = Signature::sign(&message, secret_key)?;
        let signer = signature.recover_public_key(&message)?;
        if signer != self.sender {
            return Err(ChainError::Transaction(
                "Signing key does not match the transaction sender".to_string(),
            ));
        }

        self.signature = Some(signature);
        Ok(())
    }

    /// Returns `Ok(false)` for unsigned transactions and for signatures that recover to
    /// a key other than `sender`.
    pub fn verify_signature(&self) -> Result<bool> {
        let signature = match &self.signature {
            Some(signature) => signature,
            None => return Ok(false),
        };

        let message = self.unsigned_bytes()?;
        match signature.recover_public_key(&message) {
            Ok(signer) => Ok(signer == self.sender),
            Err(_) => Ok(false),
        }
    }

    /// Check that the stored hash still matches the unsigned fields.
    pub fn verify_hash(&self) -> Result<bool> {
        Ok(sha3_digest(self.unsigned_bytes()?.as_slice()) == self.hash)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize::<Transaction>(bytes)
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_account_nonce(&self) -> i64 {
        self.account_nonce
    }

    pub fn get_sender(&self) -> &[u8] {
        self.sender.as_slice()
    }

    pub fn get_recipient(&self) -> &[u8] {
        self.recipient.as_slice()
    }

    pub fn get_value(&self) -> f64 {
        self.value
    }

    pub fn get_operation(&self) -> Operation {
        self.operation
    }

    pub fn get_payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::{generate_secret_key, public_key_from_secret};

    fn keypair() -> ([u8; 32], Vec<u8>) {
        let secret = generate_secret_key().unwrap();
        let public = public_key_from_secret(&secret).unwrap();
        (secret, public)
    }

    #[test]
    fn test_hash_covers_unsigned_fields() {
        let (_, public) = keypair();
        let a = Transaction::new(0, &public, &public, 1.5, Operation::AddFile, b"f").unwrap();
        let b = Transaction::new(0, &public, &public, 1.5, Operation::AddFile, b"f").unwrap();
        let c = Transaction::new(1, &public, &public, 1.5, Operation::AddFile, b"f").unwrap();

        assert_eq!(a.get_hash(), b.get_hash());
        assert_ne!(a.get_hash(), c.get_hash());
        assert_eq!(a.get_hash().len(), crate::utils::HASH_LEN);
        assert!(a.verify_hash().unwrap());
    }

    #[test]
    fn test_sign_and_verify() {
        let (secret, public) = keypair();
        let mut tx = Transaction::new(3, &public, b"recipient", 10.0, Operation::Transfer, &[])
            .unwrap();
        let hash_before = tx.get_hash().to_vec();

        assert!(!tx.verify_signature().unwrap());
        tx.sign(&secret).unwrap();

        assert!(tx.is_signed());
        assert!(tx.verify_signature().unwrap());
        // Signing never touches the hash
        assert_eq!(tx.get_hash(), hash_before.as_slice());
    }

    #[test]
    fn test_second_signature_rejected() {
        let (secret, public) = keypair();
        let mut tx = Transaction::new(0, &public, b"r", 1.0, Operation::Transfer, &[]).unwrap();
        tx.sign(&secret).unwrap();
        assert!(tx.sign(&secret).is_err());
    }

    #[test]
    fn test_sign_with_foreign_key_rejected() {
        let (_, public) = keypair();
        let (other_secret, _) = keypair();
        let mut tx = Transaction::new(0, &public, b"r", 1.0, Operation::Transfer, &[]).unwrap();

        assert!(tx.sign(&other_secret).is_err());
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_allocation_shape() {
        let tx = Transaction::new_allocation(b"alice", 100.0).unwrap();
        assert_eq!(tx.get_account_nonce(), GENESIS_ACCOUNT_NONCE);
        assert_eq!(tx.get_sender(), GENESIS_SENDER);
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_serialized_transaction_keeps_signature() {
        let (secret, public) = keypair();
        let mut tx = Transaction::new(0, &public, b"r", 2.0, Operation::EditFile, b"x").unwrap();
        tx.sign(&secret).unwrap();

        let decoded = Transaction::deserialize(&tx.serialize().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify_signature().unwrap());
    }

    #[test]
    fn test_non_finite_value_rejected() {
        assert!(Transaction::new(0, &[], &[], f64::NAN, Operation::Transfer, &[]).is_err());
    }
}
