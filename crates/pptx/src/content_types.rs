//! Maintenance of the package's `[Content_Types].xml`.
//!
//! Every part in an OPC package needs a content type, either through a
//! `<Default Extension=".."/>` entry or a per-part `<Override/>`. Media
//! converted to a new format get their extension registered here.

use pptslim_core::{ArchiveMember, Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Path of the content types part.
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

const UTF8_BOM: char = '\u{feff}';

/// MIME type for an image extension, if it is one we produce.
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Extensions declared by `<Default>` entries, in document order.
pub fn declared_extensions(xml: &str) -> Result<Vec<String>> {
    Ok(scan(xml)?.extensions)
}

/// Ensure `extension` has a `<Default>` entry.
///
/// Returns the rewritten member, or `None` if the extension is already
/// declared (compared case-insensitively).
pub fn ensure_default(
    member: &ArchiveMember,
    extension: &str,
    content_type: &str,
) -> Result<Option<ArchiveMember>> {
    let xml = std::str::from_utf8(&member.data).map_err(|e| Error::MalformedMember {
        member: member.path.clone(),
        reason: e.to_string(),
    })?;

    let scanned = scan(xml).map_err(|e| match e {
        Error::MalformedMember { reason, .. } => Error::MalformedMember {
            member: member.path.clone(),
            reason,
        },
        e => e,
    })?;

    if scanned
        .extensions
        .iter()
        .any(|declared| declared.eq_ignore_ascii_case(extension))
    {
        return Ok(None);
    }

    let insert_at = scanned.types_end.ok_or_else(|| Error::MalformedMember {
        member: member.path.clone(),
        reason: "no closing </Types> element".to_string(),
    })?;

    let entry = format!(
        r#"<Default Extension="{}" ContentType="{}"/>"#,
        extension, content_type
    );
    let mut data = Vec::with_capacity(member.data.len() + entry.len());
    data.extend_from_slice(&member.data[..insert_at]);
    data.extend_from_slice(entry.as_bytes());
    data.extend_from_slice(&member.data[insert_at..]);

    log::debug!("Registered .{} as {} in {}", extension, content_type, member.path);

    Ok(Some(ArchiveMember::new(member.path.clone(), data)))
}

#[derive(Debug, Default)]
struct Scanned {
    extensions: Vec<String>,
    /// Byte offset in the original text at which the root element's end tag starts.
    types_end: Option<usize>,
}

fn scan(xml: &str) -> Result<Scanned> {
    // The reader skips a leading BOM, so its positions start after it.
    let (offset, body) = match xml.strip_prefix(UTF8_BOM) {
        Some(rest) => (UTF8_BOM.len_utf8(), rest),
        None => (0, xml),
    };

    let mut scanned = Scanned::default();
    let mut reader = Reader::from_str(body);

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Default" =>
            {
                for attr in e.attributes().flatten() {
                    if local_name(attr.key.as_ref()) == b"Extension" {
                        scanned
                            .extensions
                            .push(String::from_utf8_lossy(&attr.value).to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == b"Types" => {
                scanned.types_end = Some(position + offset);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::MalformedMember {
                    member: CONTENT_TYPES_PATH.to_string(),
                    reason: format!("Error parsing content types: {}", e),
                });
            }
            _ => {}
        }
    }

    Ok(scanned)
}

/// Extract the local name from a potentially namespaced XML name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}
