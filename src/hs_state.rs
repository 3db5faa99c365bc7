use bytes::{BufMut, Bytes, BytesMut};
use zeroize::Zeroizing;

use crate::{
    cipher_state::CipherPair,
    error::{CryptoError, HandshakeError},
    params::NoiseParams,
    pattern::Token,
    primitives::{dh, KeyPair},
    symm_state::SymmState,
};

/// Largest handshake or transport message Noise allows.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Keys supplied up front. Anything a pattern needs and is missing is reported as
/// [`HandshakeError::MissingKey`].
#[derive(Default)]
pub struct HandshakeKeys {
    pub local_static: Option<KeyPair>,
    /// Fixed ephemeral, for reproducible transcripts. Generated on demand otherwise.
    pub local_ephemeral: Option<KeyPair>,
    pub remote_static: Option<Vec<u8>>,
    pub psk: Option<[u8; 32]>,
}

#[derive(Clone, Copy)]
enum KeyType {
    Ephemeral,
    Static,
}

/// Which key of each side a DH token combines.
struct DHPair {
    initiator: KeyType,
    responder: KeyType,
}

impl DHPair {
    fn of(token: Token) -> Option<Self> {
        use KeyType::*;
        let (initiator, responder) = match token {
            Token::EE => (Ephemeral, Ephemeral),
            Token::ES => (Ephemeral, Static),
            Token::SE => (Static, Ephemeral),
            Token::SS => (Static, Static),
            Token::E | Token::S | Token::Psk => return None,
        };
        Some(Self {
            initiator,
            responder,
        })
    }
}

/// Drives one handshake, message by message, until [`HsState::split`].
pub struct HsState {
    params: NoiseParams,
    role: Role,
    symm_state: SymmState,
    s: Option<KeyPair>,
    e: Option<KeyPair>,
    rs: Option<Vec<u8>>,
    re: Option<Vec<u8>>,
    psk: Option<Zeroizing<[u8; 32]>>,
    cursor: usize,
    poisoned: bool,
}

impl HsState {
    pub fn start(
        params: NoiseParams,
        role: Role,
        prologue: &[u8],
        keys: HandshakeKeys,
    ) -> Result<Self, HandshakeError> {
        let HandshakeKeys {
            local_static,
            local_ephemeral,
            remote_static,
            psk,
        } = keys;

        for pair in [&local_static, &local_ephemeral].into_iter().flatten() {
            if pair.alg() != params.dh {
                return Err(CryptoError::UnsupportedAlgorithm(pair.alg().to_string()).into());
            }
        }
        if remote_static
            .as_ref()
            .is_some_and(|rs| rs.len() != params.dh.dh_len())
        {
            return Err(CryptoError::InvalidPublicKey.into());
        }
        if params.pattern.psk.is_some() && psk.is_none() {
            return Err(HandshakeError::MissingKey("psk"));
        }

        let proto_name = params.to_string();
        let mut symm_state = SymmState::init(proto_name.as_bytes(), params.hash, params.cipher);
        symm_state.mix_hash(prologue);

        let mut me = Self {
            params,
            role,
            symm_state,
            s: local_static,
            e: local_ephemeral,
            rs: remote_static,
            re: None,
            psk: psk.map(Zeroizing::new),
            cursor: 0,
            poisoned: false,
        };
        me.mix_pre_messages()?;
        Ok(me)
    }

    /// Pre-message keys go into the transcript initiator first.
    fn mix_pre_messages(&mut self) -> Result<(), HandshakeError> {
        let base = self.params.pattern.base;
        for (owner, tokens) in [
            (Role::Initiator, base.initiator_pre()),
            (Role::Responder, base.responder_pre()),
        ] {
            for token in tokens {
                let local = owner == self.role;
                let key = match (token, local) {
                    (Token::S, true) => self.s.as_ref().map(|s| s.public()),
                    (Token::S, false) => self.rs.as_deref(),
                    _ => unreachable!("pre-messages only carry static keys"),
                };
                let key = key.ok_or(HandshakeError::MissingKey(if local {
                    "local static"
                } else {
                    "remote static"
                }))?;
                self.symm_state.mix_hash(key);
            }
        }
        Ok(())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == self.params.pattern.message_count()
    }

    /// Whether the next message is ours to write.
    pub fn is_my_turn(&self) -> bool {
        (self.cursor % 2 == 0) == (self.role == Role::Initiator)
    }

    pub fn handshake_hash(&self) -> &[u8] {
        self.symm_state.handshake_hash()
    }

    pub fn remote_static(&self) -> Option<&[u8]> {
        self.rs.as_deref()
    }

    fn ready(&self, writing: bool) -> Result<(), HandshakeError> {
        if self.poisoned {
            return Err(HandshakeError::Poisoned);
        }
        if self.is_finished() {
            return Err(HandshakeError::Finished);
        }
        if self.is_my_turn() != writing {
            return Err(HandshakeError::WrongTurn(if writing { "write" } else { "read" }));
        }
        Ok(())
    }

    /// Emits the next message: its tokens, then `payload` encrypted and hashed.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Bytes, HandshakeError> {
        self.ready(true)?;
        let len = self.next_message_len(payload.len());
        if len > MAX_MESSAGE_LEN {
            return Err(HandshakeError::MessageTooLarge(len));
        }
        let res = self.write_tokens(payload);
        match res {
            Ok(_) => self.cursor += 1,
            Err(_) => self.poisoned = true,
        }
        res
    }

    fn write_tokens(&mut self, payload: &[u8]) -> Result<Bytes, HandshakeError> {
        let mut buff = BytesMut::new();
        let dh_alg = self.params.dh;
        let has_psk = self.params.pattern.psk.is_some();

        for token in self.params.pattern.message(self.cursor) {
            match token {
                Token::E => {
                    let e = self.e.get_or_insert_with(|| KeyPair::generate(dh_alg));
                    buff.put_slice(e.public());
                    self.symm_state.mix_hash(e.public());
                    if has_psk {
                        self.symm_state.mix_key(e.public());
                    }
                }
                Token::S => {
                    let s = self
                        .s
                        .as_ref()
                        .ok_or(HandshakeError::MissingKey("local static"))?;
                    let text = self.symm_state.encrypt_and_hash(s.public())?;
                    buff.put_slice(&text);
                }
                Token::Psk => self.mix_psk()?,
                dh_token => self.mix_dh(dh_token)?,
            }
        }

        let text = self.symm_state.encrypt_and_hash(payload)?;
        buff.put_slice(&text);
        Ok(buff.freeze())
    }

    /// Size of the next outgoing message for a payload of `payload_len` bytes, worked out
    /// from the tokens alone so nothing is mixed before the limit is checked.
    fn next_message_len(&self, payload_len: usize) -> usize {
        let dh_len = self.params.dh.dh_len();
        let tag_len = self.params.cipher.tag_len();
        let has_psk = self.params.pattern.psk.is_some();
        let mut keyed = self.symm_state.has_key();
        let mut len = 0;
        for token in self.params.pattern.message(self.cursor) {
            match token {
                Token::E => {
                    len += dh_len;
                    keyed |= has_psk;
                }
                Token::S => len += dh_len + if keyed { tag_len } else { 0 },
                Token::Psk | Token::EE | Token::ES | Token::SE | Token::SS => keyed = true,
            }
        }
        len + payload_len + if keyed { tag_len } else { 0 }
    }

    /// Consumes the peer's next message and returns its decrypted payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        self.ready(false)?;
        if message.len() > MAX_MESSAGE_LEN {
            self.poisoned = true;
            return Err(HandshakeError::MessageTooLarge(message.len()));
        }
        let res = self.read_tokens(message);
        match res {
            Ok(_) => self.cursor += 1,
            Err(_) => self.poisoned = true,
        }
        res
    }

    fn read_tokens(&mut self, message: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let dh_len = self.params.dh.dh_len();
        let has_psk = self.params.pattern.psk.is_some();
        let mut rest = message;

        for token in self.params.pattern.message(self.cursor) {
            match token {
                Token::E => {
                    if self.re.is_some() {
                        return Err(HandshakeError::HandshakeFailed("remote ephemeral sent twice"));
                    }
                    let re = take(&mut rest, dh_len)?;
                    self.symm_state.mix_hash(re);
                    if has_psk {
                        self.symm_state.mix_key(re);
                    }
                    self.re = Some(re.to_vec());
                }
                Token::S => {
                    let len = if self.symm_state.has_key() {
                        dh_len + self.params.cipher.tag_len()
                    } else {
                        dh_len
                    };
                    let text = take(&mut rest, len)?;
                    let rs = self
                        .symm_state
                        .decrypt_and_hash(text)
                        .map_err(|_| HandshakeError::HandshakeFailed("remote static did not authenticate"))?;
                    self.rs = Some(rs);
                }
                Token::Psk => self.mix_psk()?,
                dh_token => self.mix_dh(dh_token)?,
            }
        }

        self.symm_state
            .decrypt_and_hash(rest)
            .map_err(|_| HandshakeError::HandshakeFailed("payload did not authenticate"))
    }

    fn mix_psk(&mut self) -> Result<(), HandshakeError> {
        let psk = self.psk.as_ref().ok_or(HandshakeError::MissingKey("psk"))?;
        self.symm_state.mix_key_and_hash(psk.as_slice());
        Ok(())
    }

    fn mix_dh(&mut self, token: Token) -> Result<(), HandshakeError> {
        let Some(DHPair {
            initiator,
            responder,
        }) = DHPair::of(token)
        else {
            unreachable!("{token:?} is not a DH token");
        };
        let (mine, theirs) = match self.role {
            Role::Initiator => (initiator, responder),
            Role::Responder => (responder, initiator),
        };
        let local = match mine {
            KeyType::Ephemeral => self.e.as_ref().ok_or(HandshakeError::MissingKey("local ephemeral")),
            KeyType::Static => self.s.as_ref().ok_or(HandshakeError::MissingKey("local static")),
        }?;
        let remote = match theirs {
            KeyType::Ephemeral => self.re.as_deref().ok_or(HandshakeError::MissingKey("remote ephemeral")),
            KeyType::Static => self.rs.as_deref().ok_or(HandshakeError::MissingKey("remote static")),
        }?;
        let shared = dh(self.params.dh, local, remote)?;
        self.symm_state.mix_key(&shared);
        Ok(())
    }

    /// Consumes the finished handshake into transport ciphers, oriented so that our writer
    /// is the peer's reader.
    pub fn split(self) -> Result<CipherPair, HandshakeError> {
        if self.poisoned {
            return Err(HandshakeError::Poisoned);
        }
        if !self.is_finished() {
            return Err(HandshakeError::NotFinished);
        }
        let (c1, c2) = self.symm_state.split();
        Ok(match self.role {
            Role::Initiator => CipherPair {
                writer: c1,
                reader: c2,
            },
            Role::Responder => CipherPair {
                writer: c2,
                reader: c1,
            },
        })
    }
}

fn take<'a>(rest: &mut &'a [u8], len: usize) -> Result<&'a [u8], HandshakeError> {
    if rest.len() < len {
        return Err(HandshakeError::HandshakeFailed("message too short"));
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        pattern::Pattern,
        primitives::{CipherAlg, DhAlg, HashAlg},
    };

    fn params(name: &str) -> NoiseParams {
        name.parse().unwrap()
    }

    /// Both sides get statics; each side knows whatever the pattern pre-shares of the other.
    fn peers(params: NoiseParams, prologue: &[u8], psk: Option<[u8; 32]>) -> (HsState, HsState) {
        let init_s = KeyPair::generate(params.dh);
        let resp_s = KeyPair::generate(params.dh);
        let base = params.pattern.base;

        let initer = HsState::start(
            params,
            Role::Initiator,
            prologue,
            HandshakeKeys {
                remote_static: (!base.responder_pre().is_empty()).then(|| resp_s.public().to_vec()),
                local_static: Some(init_s.clone()),
                psk,
                ..Default::default()
            },
        )
        .unwrap();
        let resper = HsState::start(
            params,
            Role::Responder,
            prologue,
            HandshakeKeys {
                remote_static: (!base.initiator_pre().is_empty()).then(|| init_s.public().to_vec()),
                local_static: Some(resp_s),
                psk,
                ..Default::default()
            },
        )
        .unwrap();
        (initer, resper)
    }

    fn run(mut initer: HsState, mut resper: HsState) -> (CipherPair, CipherPair) {
        let mut turn = 0u8;
        while !initer.is_finished() {
            let (writer, reader) = if initer.is_my_turn() {
                (&mut initer, &mut resper)
            } else {
                (&mut resper, &mut initer)
            };
            let payload = [turn; 5];
            let msg = writer.write_message(&payload).unwrap();
            assert_eq!(reader.read_message(&msg).unwrap(), payload);
            turn += 1;
        }
        assert!(resper.is_finished());
        assert_eq!(initer.handshake_hash(), resper.handshake_hash());
        (initer.split().unwrap(), resper.split().unwrap())
    }

    fn assert_paired(mut a: CipherPair, mut b: CipherPair, one_way: bool) {
        assert!(a.writer == b.reader);
        let ct = a.writer.encrypt_with_ad(&[], b"ping").unwrap();
        assert_eq!(b.reader.decrypt_with_ad(&[], &ct).unwrap(), b"ping");
        if !one_way {
            assert!(b.writer == a.reader);
            let ct = b.writer.encrypt_with_ad(&[], b"pong").unwrap();
            assert_eq!(a.reader.decrypt_with_ad(&[], &ct).unwrap(), b"pong");
        }
    }

    #[test]
    fn init_hs() {
        let proto_name = b"Noise_NN_25519_ChaChaPoly_BLAKE2s";
        let mut symm_state_ref = SymmState::init(proto_name, HashAlg::Blake2s, CipherAlg::ChaChaPoly);
        symm_state_ref.mix_hash(&[]);

        let nn = NoiseParams::new(Pattern::NN, DhAlg::X25519, CipherAlg::ChaChaPoly, HashAlg::Blake2s);
        let (mut hs_state_initer, mut hs_state_resper) = peers(nn, &[], None);
        assert!(
            hs_state_initer.symm_state == symm_state_ref,
            "symmetric state not initiated correctly"
        );

        let msg = hs_state_initer.write_message(&[]).unwrap();
        assert_eq!(msg.len(), 32);
        hs_state_resper.read_message(&msg).unwrap();
        assert_eq!(
            hs_state_resper.re.as_deref(),
            hs_state_initer.e.as_ref().map(|e| e.public())
        );

        let msg = hs_state_resper.write_message(&[]).unwrap();
        assert_eq!(msg.len(), 32 + 16);
        hs_state_initer.read_message(&msg).unwrap();

        let channel = (hs_state_initer.split().unwrap(), hs_state_resper.split().unwrap());
        assert_paired(channel.0, channel.1, false);
    }

    #[test]
    fn every_pattern_and_suite() {
        let patterns = [
            "N", "K", "X", "NN", "NK", "NX", "KN", "KK", "KX", "XN", "XK", "XX", "IN", "IK", "IX",
        ];
        for hash in ["BLAKE2b", "BLAKE2s", "SHA256", "SHA512"] {
            for pattern in patterns {
                let p = params(&format!("Noise_{pattern}_25519_ChaChaPoly_{hash}"));
                let (initer, resper) = peers(p, b"prologue", None);
                let (a, b) = run(initer, resper);
                assert_paired(a, b, p.pattern.base.is_one_way());
            }
        }
    }

    #[test]
    fn learns_remote_static() {
        let (mut initer, mut resper) = peers(params("Noise_XX_25519_ChaChaPoly_BLAKE2b"), &[], None);
        let resp_pub = resper.s.as_ref().unwrap().public().to_vec();
        let init_pub = initer.s.as_ref().unwrap().public().to_vec();

        let m1 = initer.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let m2 = resper.write_message(&[]).unwrap();
        initer.read_message(&m2).unwrap();
        assert_eq!(initer.remote_static(), Some(resp_pub.as_slice()));
        let m3 = initer.write_message(&[]).unwrap();
        resper.read_message(&m3).unwrap();
        assert_eq!(resper.remote_static(), Some(init_pub.as_slice()));
    }

    #[test]
    fn psk_modifiers() {
        for name in [
            "Noise_NNpsk0_25519_ChaChaPoly_BLAKE2b",
            "Noise_NNpsk2_25519_ChaChaPoly_BLAKE2b",
            "Noise_XXpsk3_25519_ChaChaPoly_SHA256",
            "Noise_IKpsk1_25519_ChaChaPoly_BLAKE2s",
            "Noise_Npsk0_25519_ChaChaPoly_BLAKE2s",
        ] {
            let p = params(name);
            let (initer, resper) = peers(p, &[], Some([0x11; 32]));
            let (a, b) = run(initer, resper);
            assert_paired(a, b, p.pattern.base.is_one_way());
        }
    }

    #[test]
    fn psk_mismatch_fails() {
        let p = params("Noise_NNpsk0_25519_ChaChaPoly_BLAKE2b");
        let (mut initer, _) = peers(p, &[], Some([1; 32]));
        let (_, mut resper) = peers(p, &[], Some([2; 32]));
        let m1 = initer.write_message(b"hi").unwrap();
        assert!(matches!(
            resper.read_message(&m1),
            Err(HandshakeError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn missing_psk_is_rejected_up_front() {
        let res = HsState::start(
            params("Noise_XXpsk3_25519_ChaChaPoly_BLAKE2b"),
            Role::Initiator,
            &[],
            HandshakeKeys::default(),
        );
        assert!(matches!(res, Err(HandshakeError::MissingKey("psk"))));
    }

    #[test]
    fn turns_are_enforced() {
        let (mut initer, mut resper) = peers(params("Noise_NN_25519_ChaChaPoly_BLAKE2b"), &[], None);
        assert!(matches!(resper.write_message(&[]), Err(HandshakeError::WrongTurn(_))));
        assert!(matches!(initer.read_message(&[0; 32]), Err(HandshakeError::WrongTurn(_))));

        let m1 = initer.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let m2 = resper.write_message(&[]).unwrap();
        initer.read_message(&m2).unwrap();
        assert!(matches!(initer.write_message(&[]), Err(HandshakeError::Finished)));
    }

    #[test]
    fn split_before_the_end() {
        let (initer, _) = peers(params("Noise_NN_25519_ChaChaPoly_BLAKE2b"), &[], None);
        assert!(matches!(initer.split(), Err(HandshakeError::NotFinished)));
    }

    #[test]
    fn tampering_poisons() {
        let (mut initer, mut resper) = peers(params("Noise_XX_25519_ChaChaPoly_BLAKE2b"), &[], None);
        let m1 = initer.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let mut m2 = resper.write_message(b"secret").unwrap().to_vec();
        let last = m2.len() - 1;
        m2[last] ^= 1;
        assert!(matches!(
            initer.read_message(&m2),
            Err(HandshakeError::HandshakeFailed(_))
        ));
        assert!(matches!(initer.write_message(&[]), Err(HandshakeError::Poisoned)));
        assert!(matches!(initer.split(), Err(HandshakeError::Poisoned)));
    }

    #[test]
    fn truncated_message() {
        let (mut initer, mut resper) = peers(params("Noise_NN_25519_ChaChaPoly_BLAKE2b"), &[], None);
        let m1 = initer.write_message(&[]).unwrap();
        assert!(matches!(
            resper.read_message(&m1[..31]),
            Err(HandshakeError::HandshakeFailed("message too short"))
        ));
    }

    #[test]
    fn prologue_mismatch() {
        let p = params("Noise_NN_25519_ChaChaPoly_BLAKE2b");
        let (mut initer, _) = peers(p, b"v1", None);
        let (_, mut resper) = peers(p, b"v2", None);
        let m1 = initer.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let m2 = resper.write_message(&[]).unwrap();
        assert!(initer.read_message(&m2).is_err());
    }

    #[test]
    fn wrong_responder_key() {
        let p = params("Noise_NK_25519_ChaChaPoly_BLAKE2b");
        let impostor = KeyPair::generate(DhAlg::X25519);
        let mut initer = HsState::start(
            p,
            Role::Initiator,
            &[],
            HandshakeKeys {
                remote_static: Some(impostor.public().to_vec()),
                ..Default::default()
            },
        )
        .unwrap();
        let (_, mut resper) = peers(p, &[], None);
        let m1 = initer.write_message(b"hello").unwrap();
        assert!(matches!(
            resper.read_message(&m1),
            Err(HandshakeError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn replayed_response_is_rejected() {
        let p = params("Noise_XX_25519_ChaChaPoly_BLAKE2b");
        let (mut initer, mut resper) = peers(p, &[], None);
        let m1 = initer.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let captured = resper.write_message(&[]).unwrap();

        // A fresh initiator has a different ephemeral, so the old answer cannot verify.
        let (mut fresh, _) = peers(p, &[], None);
        fresh.write_message(&[]).unwrap();
        assert!(fresh.read_message(&captured).is_err());
    }

    #[test]
    fn missing_keys() {
        let nk = HsState::start(
            params("Noise_NK_25519_ChaChaPoly_BLAKE2b"),
            Role::Initiator,
            &[],
            HandshakeKeys::default(),
        );
        assert!(matches!(nk, Err(HandshakeError::MissingKey("remote static"))));

        let mut xx = HsState::start(
            params("Noise_XN_25519_ChaChaPoly_BLAKE2b"),
            Role::Initiator,
            &[],
            HandshakeKeys::default(),
        )
        .unwrap();
        let (_, mut resper) = peers(params("Noise_XN_25519_ChaChaPoly_BLAKE2b"), &[], None);
        let m1 = xx.write_message(&[]).unwrap();
        resper.read_message(&m1).unwrap();
        let m2 = resper.write_message(&[]).unwrap();
        xx.read_message(&m2).unwrap();
        assert!(matches!(
            xx.write_message(&[]),
            Err(HandshakeError::MissingKey("local static"))
        ));

        let bad = HsState::start(
            params("Noise_NK_25519_ChaChaPoly_BLAKE2b"),
            Role::Initiator,
            &[],
            HandshakeKeys {
                remote_static: Some(vec![7; 31]),
                ..Default::default()
            },
        );
        assert!(matches!(
            bad,
            Err(HandshakeError::Crypto(CryptoError::InvalidPublicKey))
        ));
    }

    #[test]
    fn oversized_payload() {
        let (mut initer, mut resper) =
            peers(params("Noise_NN_25519_ChaChaPoly_BLAKE2b"), &[], None);
        // e alone, no key yet: 32 + payload
        assert!(matches!(
            initer.write_message(&vec![0; MAX_MESSAGE_LEN - 31]),
            Err(HandshakeError::MessageTooLarge(n)) if n == MAX_MESSAGE_LEN + 1
        ));
        let m1 = initer.write_message(&vec![0; MAX_MESSAGE_LEN - 32]).unwrap();
        assert_eq!(m1.len(), MAX_MESSAGE_LEN);
        resper.read_message(&m1).unwrap();

        // e, ee, then an encrypted payload: 32 + payload + 16
        assert!(matches!(
            resper.write_message(&vec![0; MAX_MESSAGE_LEN - 47]),
            Err(HandshakeError::MessageTooLarge(_))
        ));
        let m2 = resper.write_message(&vec![0; MAX_MESSAGE_LEN - 48]).unwrap();
        assert_eq!(m2.len(), MAX_MESSAGE_LEN);
        initer.read_message(&m2).unwrap();
        assert!(initer.is_finished() && resper.is_finished());
    }

    #[test]
    fn predicted_length_matches_every_message() {
        for name in [
            "Noise_XX_25519_ChaChaPoly_BLAKE2b",
            "Noise_IKpsk2_25519_ChaChaPoly_SHA256",
            "Noise_NNpsk0_25519_ChaChaPoly_BLAKE2s",
            "Noise_X_25519_ChaChaPoly_SHA512",
        ] {
            let (mut initer, mut resper) = peers(params(name), &[], Some([7; 32]));
            while !initer.is_finished() {
                let (writer, reader) = if initer.is_my_turn() {
                    (&mut initer, &mut resper)
                } else {
                    (&mut resper, &mut initer)
                };
                let predicted = writer.next_message_len(3);
                let msg = writer.write_message(b"abc").unwrap();
                assert_eq!(msg.len(), predicted, "{name}");
                reader.read_message(&msg).unwrap();
            }
        }
    }

    #[test]
    fn fixed_ephemerals_give_reproducible_transcripts() {
        let p = params("Noise_NN_25519_ChaChaPoly_SHA256");
        let transcript = || {
            let keys = |k: u8| HandshakeKeys {
                local_ephemeral: Some(KeyPair::from_private(DhAlg::X25519, [k; 32])),
                ..Default::default()
            };
            let mut initer = HsState::start(p, Role::Initiator, b"p", keys(1)).unwrap();
            let mut resper = HsState::start(p, Role::Responder, b"p", keys(2)).unwrap();
            let m1 = initer.write_message(b"a").unwrap();
            resper.read_message(&m1).unwrap();
            let m2 = resper.write_message(b"b").unwrap();
            initer.read_message(&m2).unwrap();
            (m1, m2, initer.handshake_hash().to_vec())
        };
        assert_eq!(transcript(), transcript());
    }

    /// Published cacophony vector for `Noise_XX_25519_ChaChaPoly_BLAKE2b`.
    #[test]
    fn cacophony_xx_blake2b() {
        use hex_literal::hex;

        let p = params("Noise_XX_25519_ChaChaPoly_BLAKE2b");
        let prologue = hex!("4a6f686e2047616c74");
        let keys = |s: [u8; 32], e: [u8; 32]| HandshakeKeys {
            local_static: Some(KeyPair::from_private(DhAlg::X25519, s)),
            local_ephemeral: Some(KeyPair::from_private(DhAlg::X25519, e)),
            ..Default::default()
        };
        let mut initer = HsState::start(
            p,
            Role::Initiator,
            &prologue,
            keys(
                hex!("e61ef9919cde45dd5f82166404bd08e38bceb5dfdfded0a34c8df7ed542214d1"),
                hex!("893e28b9dc6ca8d611ab664754b8ceb7bac5117349a4439a6b0569da977c464a"),
            ),
        )
        .unwrap();
        let mut resper = HsState::start(
            p,
            Role::Responder,
            &prologue,
            keys(
                hex!("4a3acbfdb163dec651dfa3194dece676d437029c62a408b4c5ea9114246e4893"),
                hex!("bbdb4cdbd309f1a1f2e1456967fe288cadd6f712d65dc7b7793d5e63da6b375b"),
            ),
        )
        .unwrap();

        let handshake: [(&[u8], &[u8]); 3] = [
            (
                &hex!("4c756477696720766f6e204d69736573"),
                &hex!("ca35def5ae56cec33dc2036731ab14896bc4c75dbb07a61f879f8e3afa4c79444c756477696720766f6e204d69736573"),
            ),
            (
                &hex!("4d757272617920526f746862617264"),
                &hex!(
                    "95ebc60d2b1fa672c1f46a8aa265ef51bfe38e7ccb39ec5be34069f1448088430505b6745ce64a5f33f0e8e3b83f11ce"
                    "8802bca507f4f2d8b564dbe277e1966116e132faa2dfd70b8b077b9f94b913df5056ae1319469b824a98d54bbaa82c32"
                    "5595587064f978c4b6d104f7596e6f"
                ),
            ),
            (
                &hex!("462e20412e20486179656b"),
                &hex!(
                    "99579e1c1ee15e422a57ddd6b16d37087b17558e8369c18991b4b2ca3a824abf904cdcf5458b5431a75af034ca9e9b98"
                    "2de039eaaf156775e2d580cd4e5ebae89c3f8cb2594b556d8a8169"
                ),
            ),
        ];
        for (i, (payload, expected)) in handshake.into_iter().enumerate() {
            let (writer, reader) = if i % 2 == 0 {
                (&mut initer, &mut resper)
            } else {
                (&mut resper, &mut initer)
            };
            let msg = writer.write_message(payload).unwrap();
            assert_eq!(&msg[..], expected, "message {i}");
            assert_eq!(reader.read_message(&msg).unwrap(), payload, "message {i}");
        }

        let hash = hex!(
            "8cf47d7b3cb5804c0109d48e8bcdbee2cbb65687d8ea2c92994ca361fb86151a"
            "d93627b98936cbb32de56e8abb21def3925011ac3e35db9cbeea73ab9a4392c2"
        );
        assert_eq!(initer.handshake_hash(), hash);
        assert_eq!(resper.handshake_hash(), hash);

        let mut i = initer.split().unwrap();
        let mut r = resper.split().unwrap();
        let transport: [(bool, &[u8], &[u8]); 3] = [
            (
                true,
                &hex!("4361726c204d656e676572"),
                &hex!("fc56eea290b3f3a21aac0c70cd5787b5ee99be37d2f4d751329b55"),
            ),
            (
                false,
                &hex!("4a65616e2d426170746973746520536179"),
                &hex!("bb31c9da10d5639a4cdb88a12f5c61de41bbc7df09bf75d94f8184fe4157f5c68f"),
            ),
            (
                true,
                &hex!("457567656e2042f6686d20766f6e2042617765726b"),
                &hex!("f6199cadb152fb27f82be0a0891ec76a33598ae92a46cab2fb5a8ed5bf48b7f267f8370af7"),
            ),
        ];
        for (from_initer, payload, expected) in transport {
            let (tx, rx) = if from_initer {
                (&mut i.writer, &mut r.reader)
            } else {
                (&mut r.writer, &mut i.reader)
            };
            assert_eq!(tx.encrypt_with_ad(&[], payload).unwrap(), expected);
            assert_eq!(rx.decrypt_with_ad(&[], expected).unwrap(), payload);
        }
    }
}
