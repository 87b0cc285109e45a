//! JSON metadata carried in the frame head.
//!
//! Upload metadata is keyed by an integer `operation` code. Serde cannot tag an
//! enum with an integer, so the wire shape goes through [`RawUpload`] and is
//! converted into the typed [`Operation`] on the way in.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{MediaWireError, Result};

/// Source extensions the client will upload.
pub const ACCEPTED_EXTENSIONS: [&str; 2] = [".mp4", ".avi"];

/// Frame rate used for GIF clips.
pub const GIF_FPS: u32 = 10;

/// Target resolution for operation 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1920:1080")]
    FullHd,
    #[serde(rename = "1280:720")]
    Hd,
    #[serde(rename = "720:480")]
    Sd,
}

impl Resolution {
    /// Value for ffmpeg's `scale` filter.
    pub fn as_scale(&self) -> &'static str {
        match self {
            Resolution::FullHd => "1920:1080",
            Resolution::Hd => "1280:720",
            Resolution::Sd => "720:480",
        }
    }
}

/// Display aspect ratio for operation 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16/9")]
    Widescreen,
    #[serde(rename = "4/3")]
    Standard,
    #[serde(rename = "1/1")]
    Square,
}

impl AspectRatio {
    /// Value for ffmpeg's `setdar` filter.
    pub fn as_dar(&self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16/9",
            AspectRatio::Standard => "4/3",
            AspectRatio::Square => "1/1",
        }
    }
}

/// Requested transformation with exactly the parameters it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Compress,
    Resize { resolution: Resolution },
    AspectRatio { aspect_ratio: AspectRatio },
    ToAudio,
    GifClip { start_time: u64, duration: f64 },
}

impl Operation {
    pub fn code(&self) -> u8 {
        match self {
            Operation::Compress => 1,
            Operation::Resize { .. } => 2,
            Operation::AspectRatio { .. } => 3,
            Operation::ToAudio => 4,
            Operation::GifClip { .. } => 5,
        }
    }

    /// Name of the artifact produced from `file_name`.
    pub fn artifact_name(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        match self {
            Operation::Compress => format!("compressed_{}", file_name),
            Operation::Resize { .. } => format!("changed_resolution_{}", file_name),
            Operation::AspectRatio { .. } => format!("changed_aspect_ratio_{}", file_name),
            Operation::ToAudio => format!("converted_to_audio_{}.mp3", stem),
            Operation::GifClip { .. } => format!("created_gif_{}.gif", stem),
        }
    }

    /// Check clip bounds against the length of the source in seconds.
    ///
    /// Only [`Operation::GifClip`] has bounds; every other operation passes.
    pub fn validate_against(&self, source_duration: f64) -> Result<()> {
        let Operation::GifClip {
            start_time,
            duration,
        } = *self
        else {
            return Ok(());
        };
        let start = start_time as f64;
        if start >= source_duration {
            return Err(MediaWireError::InvalidParameters(format!(
                "start time {}s must be before the end of the source ({:.2}s)",
                start_time, source_duration
            )));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(MediaWireError::InvalidParameters(format!(
                "clip duration {} must be positive",
                duration
            )));
        }
        if start + duration > source_duration {
            return Err(MediaWireError::InvalidParameters(format!(
                "clip {}s + {}s runs past the end of the source ({:.2}s)",
                start_time, duration, source_duration
            )));
        }
        Ok(())
    }
}

/// Metadata sent with an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUpload", into = "RawUpload")]
pub struct UploadMetadata {
    pub file_name: String,
    pub operation: Operation,
}

impl UploadMetadata {
    pub fn new(file_name: impl Into<String>, operation: Operation) -> Self {
        Self {
            file_name: file_name.into(),
            operation,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawUpload {
    file_name: String,
    operation: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<AspectRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
}

impl TryFrom<RawUpload> for UploadMetadata {
    type Error = String;

    fn try_from(raw: RawUpload) -> std::result::Result<Self, Self::Error> {
        fn required<T>(value: Option<T>, name: &str, code: u8) -> std::result::Result<T, String> {
            value.ok_or_else(|| format!("operation {} requires `{}`", code, name))
        }

        let code = raw.operation;
        let operation = match code {
            1 => Operation::Compress,
            2 => Operation::Resize {
                resolution: required(raw.resolution, "resolution", code)?,
            },
            3 => Operation::AspectRatio {
                aspect_ratio: required(raw.aspect_ratio, "aspect_ratio", code)?,
            },
            4 => Operation::ToAudio,
            5 => {
                let start_time = required(raw.start_time, "start_time", code)?;
                let duration = required(raw.duration, "duration", code)?;
                if !duration.is_finite() || duration <= 0.0 {
                    return Err(format!("clip duration {} must be positive", duration));
                }
                Operation::GifClip {
                    start_time,
                    duration,
                }
            }
            other => return Err(format!("unknown operation code {}", other)),
        };
        Ok(UploadMetadata {
            file_name: raw.file_name,
            operation,
        })
    }
}

impl From<UploadMetadata> for RawUpload {
    fn from(meta: UploadMetadata) -> Self {
        let mut raw = RawUpload {
            file_name: meta.file_name,
            operation: meta.operation.code(),
            resolution: None,
            aspect_ratio: None,
            start_time: None,
            duration: None,
        };
        match meta.operation {
            Operation::Resize { resolution } => raw.resolution = Some(resolution),
            Operation::AspectRatio { aspect_ratio } => raw.aspect_ratio = Some(aspect_ratio),
            Operation::GifClip {
                start_time,
                duration,
            } => {
                raw.start_time = Some(start_time);
                raw.duration = Some(duration);
            }
            Operation::Compress | Operation::ToAudio => {}
        }
        raw
    }
}

/// Metadata sent back by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ReplyMetadata {
    pub fn artifact(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            error: false,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            file_name: None,
            error: true,
            error_message: Some(message.into()),
        }
    }
}

/// The error fields every inbound metadata block is checked for first.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorProbe {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Serialize metadata to the bytes placed in a frame head.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| MediaWireError::ProtocolViolation(format!("cannot encode metadata: {}", e)))
}

/// Parse a metadata block, mapping any JSON failure to a protocol violation.
pub fn from_json_bytes<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| MediaWireError::ProtocolViolation(format!("malformed metadata: {}", e)))
}

/// Reduce a peer-supplied file name to a single path component.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        return Err(MediaWireError::ProtocolViolation(format!(
            "invalid file name {:?}",
            name
        )));
    }
    Ok(base.to_string())
}

/// Media type string for a path: its extension with the leading dot.
pub fn media_type_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_wire_shape() {
        let meta = UploadMetadata::new("a.mp4", Operation::Compress);
        let json = String::from_utf8(to_json_bytes(&meta).unwrap()).unwrap();
        assert_eq!(json, r#"{"file_name":"a.mp4","operation":1}"#);
        assert_eq!(json.len(), 35);
    }

    #[test]
    fn test_parameters_follow_operation() {
        let meta: UploadMetadata = from_json_bytes(
            br#"{"file_name":"v.avi","operation":2,"resolution":"1280:720"}"#,
        )
        .unwrap();
        assert_eq!(
            meta.operation,
            Operation::Resize {
                resolution: Resolution::Hd
            }
        );

        let meta: UploadMetadata = from_json_bytes(
            br#"{"file_name":"v.mp4","operation":5,"start_time":3,"duration":2.5}"#,
        )
        .unwrap();
        assert_eq!(
            meta.operation,
            Operation::GifClip {
                start_time: 3,
                duration: 2.5
            }
        );

        let json = to_json_bytes(&UploadMetadata::new(
            "v.mp4",
            Operation::AspectRatio {
                aspect_ratio: AspectRatio::Standard,
            },
        ))
        .unwrap();
        assert_eq!(
            json,
            br#"{"file_name":"v.mp4","operation":3,"aspect_ratio":"4/3"}"#.to_vec()
        );
    }

    #[test]
    fn test_missing_parameter_and_unknown_code_are_rejected() {
        let err = from_json_bytes::<UploadMetadata>(br#"{"file_name":"v.mp4","operation":2}"#)
            .unwrap_err();
        assert!(
            matches!(err, MediaWireError::ProtocolViolation(ref m) if m.contains("resolution"))
        );

        let err = from_json_bytes::<UploadMetadata>(br#"{"file_name":"v.mp4","operation":9}"#)
            .unwrap_err();
        assert!(matches!(err, MediaWireError::ProtocolViolation(_)));

        let err = from_json_bytes::<UploadMetadata>(b"{not json").unwrap_err();
        assert!(matches!(err, MediaWireError::ProtocolViolation(_)));

        for duration in ["0", "0.0", "-3.0"] {
            let json = format!(
                r#"{{"file_name":"v.mp4","operation":5,"start_time":0,"duration":{}}}"#,
                duration
            );
            let err = from_json_bytes::<UploadMetadata>(json.as_bytes()).unwrap_err();
            assert!(
                matches!(err, MediaWireError::ProtocolViolation(ref m) if m.contains("duration")),
                "{}: {:?}",
                duration,
                err
            );
        }
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(
            Operation::Compress.artifact_name("a.mp4"),
            "compressed_a.mp4"
        );
        assert_eq!(
            Operation::ToAudio.artifact_name("clip.avi"),
            "converted_to_audio_clip.mp3"
        );
        let gif = Operation::GifClip {
            start_time: 0,
            duration: 1.0,
        };
        assert_eq!(gif.artifact_name("clip.mp4"), "created_gif_clip.gif");
    }

    #[test]
    fn test_gif_bounds() {
        let clip = |start_time, duration| Operation::GifClip {
            start_time,
            duration,
        };
        assert!(clip(0, 10.0).validate_against(10.0).is_ok());
        assert!(clip(9, 1.0).validate_against(10.0).is_ok());
        assert!(clip(10, 1.0).validate_against(10.0).is_err());
        assert!(clip(2, 0.0).validate_against(10.0).is_err());
        assert!(clip(5, 5.5).validate_against(10.0).is_err());
        assert!(Operation::Compress.validate_against(0.0).is_ok());
    }

    #[test]
    fn test_reply_shapes() {
        let ok = to_json_bytes(&ReplyMetadata::artifact("compressed_a.mp4")).unwrap();
        assert_eq!(
            ok,
            br#"{"file_name":"compressed_a.mp4","error":false,"error_message":null}"#.to_vec()
        );

        let probe: ErrorProbe =
            from_json_bytes(&to_json_bytes(&ReplyMetadata::failure("boom")).unwrap()).unwrap();
        assert!(probe.error);
        assert_eq!(probe.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("dir/a.mp4").unwrap(), "a.mp4");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
    }

    #[test]
    fn test_media_type_of() {
        assert_eq!(media_type_of(Path::new("x/y/clip.mp4")), ".mp4");
        assert_eq!(media_type_of(Path::new("noext")), "");
    }
}
