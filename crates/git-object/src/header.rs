use crate::{ObjectError, ObjectType};

/// Parse an object header from raw bytes.
///
/// The header format is `"<type> <size>\0"`. Returns `(type, content_size, header_length)`
/// where `header_length` includes the null terminator.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let null_pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing null terminator".into()))?;

    let header = &data[..null_pos];
    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let type_bytes = &header[..space_pos];
    let size_bytes = &header[space_pos + 1..];

    let obj_type = ObjectType::from_bytes(type_bytes)?;

    let size_str = std::str::from_utf8(size_bytes)
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII size".into()))?;
    if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ObjectError::InvalidHeader(format!(
            "invalid size: {size_str}"
        )));
    }
    if size_str.len() > 1 && size_str.starts_with('0') {
        return Err(ObjectError::InvalidHeader(format!(
            "size has leading zero: {size_str}"
        )));
    }
    let content_size: usize = size_str
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("invalid size: {size_str}")))?;

    Ok((obj_type, content_size, null_pos + 1))
}

/// Write an object header: `"<type> <size>\0"`.
pub fn write_header(obj_type: ObjectType, content_size: usize) -> Vec<u8> {
    let s = format!("{} {}\0", obj_type, content_size);
    s.into_bytes()
}
