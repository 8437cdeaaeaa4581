use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Number of leading bytes inspected
const HEADER_LEN: usize = 64;

const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const MP4_BRANDS: &[&[u8; 4]] = &[b"isom", b"iso2", b"mp41", b"mp42", b"avc1", b"M4V "];

/// Container formats the pipeline knows how to rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKind {
    Avi,
    Matroska,
    Mp4,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [ContainerKind::Avi, ContainerKind::Matroska, ContainerKind::Mp4];
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerKind::Avi => "AVI",
            ContainerKind::Matroska => "Matroska",
            ContainerKind::Mp4 => "MPEG-4",
        };
        f.write_str(name)
    }
}

struct Signature {
    kind: ContainerKind,
    matches: fn(&[u8]) -> bool,
}

/// Checked in order, first match wins
const SIGNATURES: &[Signature] = &[
    Signature { kind: ContainerKind::Avi, matches: is_avi },
    Signature { kind: ContainerKind::Matroska, matches: is_matroska },
    Signature { kind: ContainerKind::Mp4, matches: is_mp4 },
];

fn is_avi(header: &[u8]) -> bool {
    header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"AVI "
}

fn is_matroska(header: &[u8]) -> bool {
    header.starts_with(EBML_MAGIC) && contains(header, b"matroska")
}

fn is_mp4(header: &[u8]) -> bool {
    header.len() >= 12
        && &header[4..8] == b"ftyp"
        && MP4_BRANDS.iter().any(|brand| &header[8..12] == brand.as_slice())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Classify raw header bytes.
pub fn classify_bytes(header: &[u8]) -> Option<ContainerKind> {
    SIGNATURES
        .iter()
        .find(|signature| (signature.matches)(header))
        .map(|signature| signature.kind)
}

/// Classify a file by its content signature. The file name plays no part.
pub fn classify(path: &Path) -> Option<ContainerKind> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    let read = File::open(path)
        .and_then(|file| file.take(HEADER_LEN as u64).read_to_end(&mut header));

    match read {
        Ok(_) => classify_bytes(&header),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_known_signatures() {
        assert_eq!(classify_bytes(AVI), Some(ContainerKind::Avi));
        assert_eq!(classify_bytes(MATROSKA), Some(ContainerKind::Matroska));
        assert_eq!(classify_bytes(MP4), Some(ContainerKind::Mp4));
    }

    #[test]
    fn test_unknown_signatures() {
        assert_eq!(classify_bytes(WAV), None);
        assert_eq!(classify_bytes(WEBM), None);
        assert_eq!(classify_bytes(M4A), None);
        assert_eq!(classify_bytes(b"1\n00:00:01,000 --> 00:00:02,000\nHello\n"), None);
        assert_eq!(classify_bytes(b""), None);
        assert_eq!(classify_bytes(b"RIFF"), None);
    }

    #[test]
    fn test_classification_ignores_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let disguised = dir.path().join("holiday.avi");
        std::fs::write(&disguised, MATROSKA).unwrap();
        let text = dir.path().join("notes.mkv");
        std::fs::write(&text, "not a video").unwrap();

        assert_eq!(classify(&disguised), Some(ContainerKind::Matroska));
        assert_eq!(classify(&text), None);
    }

    #[test]
    fn test_missing_file() {
        assert_eq!(classify(Path::new("/nonexistent/movie.mkv")), None);
    }
}
