use zeroize::Zeroizing;

use crate::{
    cipher_state::CipherState,
    error::CryptoError,
    primitives::{hash, hash_parts, hkdf, CipherAlg, HashAlg},
};

#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct SymmState {
    hash_alg: HashAlg,
    cipher_alg: CipherAlg,
    cipher_state: Option<CipherState>,
    chaining_key: Zeroizing<Vec<u8>>,
    output_hash: Vec<u8>,
}

impl SymmState {
    /// Starts `h` and `ck` from the protocol name: zero-padded when it fits in a hash,
    /// hashed otherwise.
    pub fn init(proto_name: &[u8], hash_alg: HashAlg, cipher_alg: CipherAlg) -> Self {
        let init_state = if proto_name.len() > hash_alg.hash_len() {
            hash(hash_alg, proto_name)
        } else {
            let mut init_state = vec![0; hash_alg.hash_len()];
            init_state[0..proto_name.len()].copy_from_slice(proto_name);
            init_state
        };

        Self {
            hash_alg,
            cipher_alg,
            cipher_state: None,
            chaining_key: Zeroizing::new(init_state.clone()),
            output_hash: init_state,
        }
    }

    pub fn has_key(&self) -> bool {
        self.cipher_state.is_some()
    }

    /// The transcript hash so far. After the last message this is the channel-binding value.
    pub fn handshake_hash(&self) -> &[u8] {
        &self.output_hash
    }

    pub fn mix_key(&mut self, input: &[u8]) {
        let [new_ck, temp_k, _] = hkdf(self.hash_alg, &self.chaining_key, input);
        self.rekey_cipher(&temp_k);
        self.chaining_key = new_ck;
    }

    pub fn mix_hash(&mut self, data: &[u8]) {
        self.output_hash = hash_parts(self.hash_alg, &[&self.output_hash, data]);
    }

    /// For pre-shared keys: the middle output is bound into the transcript.
    pub fn mix_key_and_hash(&mut self, input: &[u8]) {
        let [new_ck, temp_h, temp_k] = hkdf(self.hash_alg, &self.chaining_key, input);
        self.chaining_key = new_ck;
        self.mix_hash(&temp_h);
        self.rekey_cipher(&temp_k);
    }

    fn rekey_cipher(&mut self, derived: &[u8]) {
        self.cipher_state = Some(match self.cipher_state.take() {
            Some(k) => k.reset_key(derived),
            None => CipherState::from_derived(self.cipher_alg, derived),
        });
    }

    /// Before the first `mix_key` the text passes through in the clear, but it is
    /// still absorbed into the transcript.
    pub fn encrypt_and_hash(&mut self, plain_text: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let text = match self.cipher_state.as_mut() {
            Some(state) => state.encrypt_with_ad(&self.output_hash, plain_text)?,
            None => plain_text.to_vec(),
        };
        self.mix_hash(&text);
        Ok(text)
    }

    /// Leaves the transcript untouched when the tag does not verify.
    pub fn decrypt_and_hash(&mut self, cipher_text: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let next_hash = hash_parts(self.hash_alg, &[&self.output_hash, cipher_text]);
        let text = match self.cipher_state.as_mut() {
            Some(state) => state.decrypt_with_ad(&self.output_hash, cipher_text)?,
            None => cipher_text.to_vec(),
        };
        self.output_hash = next_hash;
        Ok(text)
    }

    /// Consumes the state into `(initiator -> responder, responder -> initiator)` ciphers.
    pub fn split(self) -> (CipherState, CipherState) {
        let [k1, k2, _] = hkdf(self.hash_alg, &self.chaining_key, &[]);
        (
            CipherState::from_derived(self.cipher_alg, &k1),
            CipherState::from_derived(self.cipher_alg, &k2),
        )
    }
}
