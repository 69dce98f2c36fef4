use crate::linestream::{LineStream, StreamError};

/// Returns true if `line` opens a new report instance, e.g.
/// `==1234==ERROR: AddressSanitizer: ...`.
pub fn is_error_start(line: &str) -> bool {
    line.starts_with("==") && line.contains("ERROR")
}

/// Advances `stream` to the next report instance.
///
/// On success the marker line is put back, so the next `read_line` returns
/// the header. Returns `Ok(false)` once the stream is exhausted.
pub fn find_next_boundary(stream: &mut LineStream<'_>) -> Result<bool, StreamError> {
    while let Some(line) = stream.read_line() {
        if is_error_start(&line) {
            stream.putback_line(1)?;
            return Ok(true);
        }
    }
    Ok(false)
}
