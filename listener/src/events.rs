//! Coordinator event decoding.
//!
//! Only two events matter to the listener. Indexed parameters arrive as
//! topics, the rest as consecutive 32-byte words of log data.

use sortes_crypto::keccak256;
use sortes_types::{u256_to_word, u64_to_word, Address, RawLog, RequestId, U256};

use crate::ListenerError;

pub const RANDOM_WORDS_REQUESTED_SIGNATURE: &str =
    "RandomWordsRequested(bytes32,uint256,uint256,uint64,uint16,uint32,uint32,address)";
pub const RANDOM_WORDS_FULFILLED_SIGNATURE: &str =
    "RandomWordsFulfilled(uint256,uint256,uint96,bool)";

/// `topics[0]` of a RandomWordsRequested log.
pub fn requested_topic() -> [u8; 32] {
    keccak256(RANDOM_WORDS_REQUESTED_SIGNATURE.as_bytes())
}

/// `topics[0]` of a RandomWordsFulfilled log.
pub fn fulfilled_topic() -> [u8; 32] {
    keccak256(RANDOM_WORDS_FULFILLED_SIGNATURE.as_bytes())
}

/// A consumer asked for randomness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomWordsRequested {
    pub key_hash: [u8; 32],
    pub request_id: RequestId,
    pub pre_seed: U256,
    pub sub_id: u64,
    pub minimum_request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
    pub sender: Address,
}

/// The coordinator accepted a fulfillment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomWordsFulfilled {
    pub request_id: RequestId,
    pub output_seed: U256,
    pub payment: U256,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Requested(RandomWordsRequested),
    Fulfilled(RandomWordsFulfilled),
}

/// Decode a coordinator log by its event signature topic.
pub fn decode_log(log: &RawLog) -> Result<CoordinatorEvent, ListenerError> {
    let signature = log
        .topics
        .first()
        .ok_or_else(|| ListenerError::LogParse("log has no topics".into()))?;

    if *signature == requested_topic() {
        decode_requested(log).map(CoordinatorEvent::Requested)
    } else if *signature == fulfilled_topic() {
        decode_fulfilled(log).map(CoordinatorEvent::Fulfilled)
    } else {
        Err(ListenerError::LogParse(format!(
            "unknown event signature 0x{}",
            hex_word(signature)
        )))
    }
}

fn decode_requested(log: &RawLog) -> Result<RandomWordsRequested, ListenerError> {
    let topics = expect_topics(log, 4)?;
    let data = DataWords::new(&log.data, 5)?;
    Ok(RandomWordsRequested {
        key_hash: topics[1],
        sub_id: word_to_u64(&topics[2], "subId")?,
        sender: Address::from_word(&topics[3]),
        request_id: RequestId::from_word(data.word(0)),
        pre_seed: U256::from_big_endian(data.word(1)),
        minimum_request_confirmations: narrow(data.word(2), "minimumRequestConfirmations")?,
        callback_gas_limit: narrow(data.word(3), "callbackGasLimit")?,
        num_words: narrow(data.word(4), "numWords")?,
    })
}

fn decode_fulfilled(log: &RawLog) -> Result<RandomWordsFulfilled, ListenerError> {
    let topics = expect_topics(log, 2)?;
    let data = DataWords::new(&log.data, 3)?;
    let success = match word_to_u64(data.word(2), "success")? {
        0 => false,
        1 => true,
        other => {
            return Err(ListenerError::LogParse(format!(
                "success flag out of range: {other}"
            )))
        }
    };
    Ok(RandomWordsFulfilled {
        request_id: RequestId::from_word(&topics[1]),
        output_seed: U256::from_big_endian(data.word(0)),
        payment: U256::from_big_endian(data.word(1)),
        success,
    })
}

impl RandomWordsRequested {
    /// Fill `base` with the topics and data this event would produce.
    pub fn to_raw_log(&self, mut base: RawLog) -> RawLog {
        base.topics = vec![
            requested_topic(),
            self.key_hash,
            u64_to_word(self.sub_id),
            self.sender.to_word(),
        ];
        base.data = [
            self.request_id.to_word(),
            u256_to_word(&self.pre_seed),
            u64_to_word(u64::from(self.minimum_request_confirmations)),
            u64_to_word(u64::from(self.callback_gas_limit)),
            u64_to_word(u64::from(self.num_words)),
        ]
        .concat();
        base
    }
}

impl RandomWordsFulfilled {
    pub fn to_raw_log(&self, mut base: RawLog) -> RawLog {
        base.topics = vec![fulfilled_topic(), self.request_id.to_word()];
        base.data = [
            u256_to_word(&self.output_seed),
            u256_to_word(&self.payment),
            u64_to_word(u64::from(self.success)),
        ]
        .concat();
        base
    }
}

fn expect_topics(log: &RawLog, count: usize) -> Result<&[[u8; 32]], ListenerError> {
    if log.topics.len() != count {
        return Err(ListenerError::LogParse(format!(
            "expected {count} topics, got {}",
            log.topics.len()
        )));
    }
    Ok(&log.topics)
}

struct DataWords<'a>(&'a [u8]);

impl<'a> DataWords<'a> {
    fn new(data: &'a [u8], words: usize) -> Result<Self, ListenerError> {
        if data.len() < words * 32 {
            return Err(ListenerError::LogParse(format!(
                "expected {} data bytes, got {}",
                words * 32,
                data.len()
            )));
        }
        Ok(Self(data))
    }

    fn word(&self, index: usize) -> &'a [u8; 32] {
        let start = index * 32;
        // Length was checked in `new`.
        <&[u8; 32]>::try_from(&self.0[start..start + 32]).unwrap_or(&[0u8; 32])
    }
}

fn word_to_u64(word: &[u8; 32], field: &str) -> Result<u64, ListenerError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(ListenerError::LogParse(format!("{field} does not fit in 64 bits")));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}

fn narrow<T: TryFrom<u64>>(word: &[u8; 32], field: &str) -> Result<T, ListenerError> {
    let value = word_to_u64(word, field)?;
    T::try_from(value).map_err(|_| ListenerError::LogParse(format!("{field} out of range: {value}")))
}

fn hex_word(word: &[u8; 32]) -> String {
    word.iter().map(|b| format!("{b:02x}")).collect()
}
