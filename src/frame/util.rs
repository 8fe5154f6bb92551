use bytes::BytesMut;

use crate::frame::Error;

/// Strips the pad-length octet and trailing padding from a padded payload,
/// leaving only the frame's own data. Returns the declared padding length.
pub fn strip_padding(payload: &mut BytesMut) -> Result<u8, Error> {
    if payload.is_empty() {
        return Err(Error::TooMuchPadding);
    }

    let pad_len = payload[0] as usize;

    if pad_len >= payload.len() {
        // Padding length must be strictly less than the remaining payload
        return Err(Error::TooMuchPadding);
    }

    let _ = payload.split_to(1);
    let data_len = payload.len() - pad_len;
    payload.truncate(data_len);

    Ok(pad_len as u8)
}
