use super::*;

/// Error reported back to the requester instead of the regular response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub component_code: u16,
    pub detail_code: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(e: &anyhow::Error) -> Self {
        let (component_code, detail_code) = Error::codes_of(e);
        let mut message = format!("{e:#}");
        // The message must fit in a u16-prefixed string.
        if message.len() > u16::MAX as usize {
            let mut end = u16::MAX as usize;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self {
            component_code,
            detail_code,
            message,
        }
    }

    pub fn into_error(self) -> Error {
        Error::Remote {
            component_code: self.component_code,
            detail_code: self.detail_code,
            message: self.message,
        }
    }
}

impl WireMessage for ErrorResponse {
    const MESSAGE_TYPE: MessageType = MessageType::ErrorResponse;
    // component code, detail code
    const BLOCK_LENGTH: u16 = 2 + 2;

    fn trailing_length(&self) -> usize {
        string_length(&self.message)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.component_code);
        buf.put_u16_le(self.detail_code);
        put_string(buf, &self.message)
    }

    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        let component_code = get_u16(block)?;
        let detail_code = get_u16(block)?;
        let message = get_string(rest)?;
        Ok(Self {
            component_code,
            detail_code,
            message,
        })
    }
}
