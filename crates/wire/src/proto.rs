/// Protobuf payload of a `LoginSuccess` auth response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginSuccessPayload {
    #[prost(uint32, tag = "1")]
    pub sidx: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub aes256_key: Vec<u8>,
}

impl LoginSuccessPayload {
    pub fn new(sidx: u32, aes256_key: [u8; 32]) -> Self {
        Self {
            sidx,
            aes256_key: aes256_key.to_vec(),
        }
    }

    /// Returns `None` if `aes256_key` isn't exactly 32 bytes, which can
    /// only happen if a peer sent a malformed payload.
    pub fn key_array(&self) -> Option<[u8; 32]> {
        self.aes256_key.clone().try_into().ok()
    }
}
