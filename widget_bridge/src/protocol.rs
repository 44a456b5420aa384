use crate::config::{AuthToken, DeepLinkTarget, LaunchTarget, WidgetType};
use crate::error::{BridgeError, Result};
use crate::exit::ExitEvent;
use crate::theme::{CssSource, SoundOverride, ThemePriority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;

pub const WIDGET_TO_HOST_CAP: usize = 1_048_576;
pub const HOST_TO_WIDGET_CAP: usize = 1_048_576;

pub const REDACTED: &str = "[redacted]";

/// Wire names for every message type in both directions.
pub mod kind {
    pub const REQUEST_INITIALIZATION: &str = "REQUEST_INITIALIZATION";
    pub const INITIALIZATION_COMPLETE: &str = "INITIALIZATION_COMPLETE";
    pub const INITIALIZATION_ERROR: &str = "INITIALIZATION_ERROR";
    pub const EXIT_REQUESTED: &str = "EXIT_REQUESTED";
    pub const CUSTOM_CSS_APPLIED: &str = "CUSTOM_CSS_APPLIED";
    pub const CUSTOM_CSS_ERROR: &str = "CUSTOM_CSS_ERROR";
    pub const CUSTOM_SOUNDS_LOADED: &str = "CUSTOM_SOUNDS_LOADED";
    pub const CUSTOM_SOUNDS_ERROR: &str = "CUSTOM_SOUNDS_ERROR";
    pub const OPEN_URL: &str = "OPEN_URL";
    pub const PLAY_SOUND: &str = "PLAY_SOUND";
    pub const NAVIGATION_COMPLETE: &str = "NAVIGATION_COMPLETE";
    pub const ERROR: &str = "ERROR";

    pub const INITIALIZE: &str = "INITIALIZE";
    pub const CUSTOM_CSS: &str = "CUSTOM_CSS";
    pub const CUSTOM_SOUNDS: &str = "CUSTOM_SOUNDS";
}

/// The `{type, payload}` unit exchanged in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Typed envelopes (element events) skip text decoding but still need a
    /// usable `type`.
    pub fn validated(self) -> Result<Self> {
        if self.kind.trim().is_empty() {
            return Err(BridgeError::malformed("envelope type is empty"));
        }
        Ok(self)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decodes one widget message. Anything that is not a json object with a
/// non-empty string `type` is a [`BridgeError::MalformedEnvelope`].
pub fn decode(text: &str) -> Result<Envelope> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| BridgeError::malformed(format!("not json: {err}")))?;
    envelope_from_value(value)
}

pub fn envelope_from_value(value: Value) -> Result<Envelope> {
    if !value.is_object() {
        return Err(BridgeError::malformed("envelope is not a json object"));
    }

    serde_json::from_value::<Envelope>(value)
        .map_err(|err| BridgeError::malformed(err.to_string()))?
        .validated()
}

pub fn encode(command: &HostCommand) -> Result<String> {
    command.to_envelope()?.to_text()
}

/// Inbound traffic, widget to host.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetMessage {
    RequestInitialization,
    InitializationComplete { config: Value },
    InitializationError { message: String },
    ExitRequested(ExitEvent),
    CustomCssApplied { detail: Value },
    CustomCssError { error: String },
    CustomSoundsLoaded { detail: Value },
    CustomSoundsError { error: String },
    OpenUrl { url: Option<String> },
    PlaySound { sound: Value },
    NavigationComplete { url: Option<String> },
    Error { detail: Value },
    Unknown { kind: String, payload: Option<Value> },
}

impl WidgetMessage {
    pub fn from_envelope(envelope: Envelope) -> Self {
        let Envelope {
            kind: name,
            payload,
        } = envelope;

        match name.as_str() {
            kind::REQUEST_INITIALIZATION => Self::RequestInitialization,
            kind::INITIALIZATION_COMPLETE => Self::InitializationComplete {
                config: payload
                    .as_ref()
                    .and_then(|payload| payload.get("config"))
                    .cloned()
                    .or(payload)
                    .unwrap_or(Value::Null),
            },
            kind::INITIALIZATION_ERROR => Self::InitializationError {
                message: describe_error(payload.as_ref()),
            },
            kind::EXIT_REQUESTED => Self::ExitRequested(ExitEvent::from_payload(payload.as_ref())),
            kind::CUSTOM_CSS_APPLIED => Self::CustomCssApplied {
                detail: payload.unwrap_or(Value::Null),
            },
            kind::CUSTOM_CSS_ERROR => Self::CustomCssError {
                error: describe_error(payload.as_ref()),
            },
            kind::CUSTOM_SOUNDS_LOADED => Self::CustomSoundsLoaded {
                detail: payload.unwrap_or(Value::Null),
            },
            kind::CUSTOM_SOUNDS_ERROR => Self::CustomSoundsError {
                error: describe_error(payload.as_ref()),
            },
            kind::OPEN_URL => Self::OpenUrl {
                url: string_field(payload.as_ref(), "url"),
            },
            kind::PLAY_SOUND => Self::PlaySound {
                sound: payload
                    .as_ref()
                    .and_then(|payload| payload.get("sound"))
                    .cloned()
                    .or(payload)
                    .unwrap_or(Value::Null),
            },
            kind::NAVIGATION_COMPLETE => Self::NavigationComplete {
                url: string_field(payload.as_ref(), "url"),
            },
            kind::ERROR => Self::Error {
                detail: payload.unwrap_or(Value::Null),
            },
            _ => Self::Unknown {
                kind: name,
                payload,
            },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::RequestInitialization => kind::REQUEST_INITIALIZATION,
            Self::InitializationComplete { .. } => kind::INITIALIZATION_COMPLETE,
            Self::InitializationError { .. } => kind::INITIALIZATION_ERROR,
            Self::ExitRequested(_) => kind::EXIT_REQUESTED,
            Self::CustomCssApplied { .. } => kind::CUSTOM_CSS_APPLIED,
            Self::CustomCssError { .. } => kind::CUSTOM_CSS_ERROR,
            Self::CustomSoundsLoaded { .. } => kind::CUSTOM_SOUNDS_LOADED,
            Self::CustomSoundsError { .. } => kind::CUSTOM_SOUNDS_ERROR,
            Self::OpenUrl { .. } => kind::OPEN_URL,
            Self::PlaySound { .. } => kind::PLAY_SOUND,
            Self::NavigationComplete { .. } => kind::NAVIGATION_COMPLETE,
            Self::Error { .. } => kind::ERROR,
            Self::Unknown { kind: name, .. } => name.as_str(),
        }
    }
}

/// Outbound traffic, host to widget.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Initialize {
        auth_token: AuthToken,
        target: LaunchTarget,
    },
    CustomCss {
        source: CssSource,
        priority: ThemePriority,
    },
    CustomSounds {
        sounds: Vec<SoundOverride>,
    },
}

impl HostCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => kind::INITIALIZE,
            Self::CustomCss { .. } => kind::CUSTOM_CSS,
            Self::CustomSounds { .. } => kind::CUSTOM_SOUNDS,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope> {
        self.envelope_with_token(None)
    }

    /// Same envelope with the auth token swapped out, for logs and diagnostics.
    pub fn to_redacted_envelope(&self) -> Result<Envelope> {
        self.envelope_with_token(Some(REDACTED))
    }

    fn envelope_with_token(&self, token_override: Option<&str>) -> Result<Envelope> {
        let payload = match self {
            Self::Initialize { auth_token, target } => {
                let deep_link = target.deep_link();
                serde_json::to_value(InitializePayload {
                    user_auth_token: token_override.unwrap_or_else(|| auth_token.expose()),
                    widget_type: target.widget_type(),
                    module_id: deep_link.and_then(DeepLinkTarget::module_id),
                    skill_id: deep_link.and_then(DeepLinkTarget::skill_id),
                })?
            }
            Self::CustomCss { source, priority } => {
                let (css, url) = match source {
                    CssSource::Inline(css) => (Some(css.as_str()), None),
                    CssSource::Url(url) => (None, Some(url.as_str())),
                };
                serde_json::to_value(CustomCssPayload {
                    css,
                    url,
                    priority: *priority,
                })?
            }
            Self::CustomSounds { sounds } => {
                serde_json::to_value(CustomSoundsPayload { sounds })?
            }
        };

        Ok(Envelope::new(self.kind(), Some(payload)))
    }
}

#[derive(Serialize)]
struct InitializePayload<'a> {
    user_auth_token: &'a str,
    widget_type: WidgetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill_id: Option<&'a str>,
}

/// Both sides are always present; the unused one is `null`.
#[derive(Serialize)]
struct CustomCssPayload<'a> {
    css: Option<&'a str>,
    url: Option<&'a str>,
    priority: ThemePriority,
}

#[derive(Serialize)]
struct CustomSoundsPayload<'a> {
    sounds: &'a [SoundOverride],
}

fn string_field(payload: Option<&Value>, field: &str) -> Option<String> {
    payload
        .and_then(|payload| payload.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn describe_error(payload: Option<&Value>) -> String {
    match payload {
        None => "unknown error".to_string(),
        Some(Value::String(message)) => message.clone(),
        Some(payload) => string_field(Some(payload), "error")
            .or_else(|| string_field(Some(payload), "message"))
            .unwrap_or_else(|| payload.to_string()),
    }
}

pub fn writer_loop<W: Write>(rx: Receiver<String>, mut writer: W) -> io::Result<()> {
    for text in rx {
        write_frame(&mut writer, text.as_bytes(), HOST_TO_WIDGET_CAP)?;
        writer.flush()?;
    }

    Ok(())
}

/// Hands every frame to `on_text` undecoded; envelope validation belongs to
/// the session so a bad frame never stops the loop.
pub fn reader_loop<R, F>(mut reader: R, mut on_text: F) -> io::Result<()>
where
    R: Read,
    F: FnMut(String) -> bool,
{
    loop {
        match read_frame(&mut reader, WIDGET_TO_HOST_CAP) {
            Ok(payload) => {
                let text = String::from_utf8_lossy(&payload).into_owned();
                if !on_text(text) {
                    return Ok(());
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::ExitSource;
    use crate::theme::ThemeCatalog;
    use serde_json::json;
    use std::io::Cursor;

    fn token() -> AuthToken {
        AuthToken::new("tok-123").expect("token")
    }

    fn initialize_text() -> String {
        encode(&HostCommand::Initialize {
            auth_token: token(),
            target: LaunchTarget::module("994850"),
        })
        .expect("encode initialize")
    }

    #[test]
    fn framed_initialize_round_trips() {
        let text = initialize_text();
        let mut out = Vec::new();
        write_frame(&mut out, text.as_bytes(), HOST_TO_WIDGET_CAP).expect("frame write");

        let mut cursor = Cursor::new(out);
        let frame = read_frame(&mut cursor, WIDGET_TO_HOST_CAP).expect("frame read");
        let envelope = decode(&String::from_utf8(frame).expect("utf8 frame")).expect("decode");

        assert_eq!(envelope.kind, kind::INITIALIZE);
        let payload = envelope.payload.expect("initialize payload");
        assert_eq!(payload["user_auth_token"], "tok-123");
        assert_eq!(payload["module_id"], "994850");
    }

    #[test]
    fn length_prefix_is_big_endian_envelope_length() {
        let text = initialize_text();
        let mut out = Vec::new();
        write_frame(&mut out, text.as_bytes(), HOST_TO_WIDGET_CAP).expect("frame write");

        let len = u32::try_from(text.len()).expect("short envelope");
        assert_eq!(&out[0..4], &len.to_be_bytes());
        assert_eq!(&out[4..], text.as_bytes());
    }

    #[test]
    fn truncated_envelope_frame_is_rejected() {
        let mut out = Vec::new();
        write_frame(&mut out, br#"{"type":"REQUEST_INITIALIZATION"}"#, WIDGET_TO_HOST_CAP)
            .expect("frame write");
        out.truncate(out.len() - 3);

        let err = read_frame(&mut Cursor::new(out), WIDGET_TO_HOST_CAP).expect_err("expected eof");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn envelopes_over_the_cap_are_refused_both_ways() {
        let dark = ThemeCatalog::builtin().get("dark").expect("dark theme").css_source();
        let text = encode(&HostCommand::CustomCss {
            source: dark,
            priority: ThemePriority::Inline,
        })
        .expect("encode css");
        let cap = text.len() - 1;

        let err = write_frame(&mut Vec::new(), text.as_bytes(), cap).expect_err("write too large");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let header = u32::try_from(text.len()).expect("short envelope").to_be_bytes();
        let err = read_frame(&mut Cursor::new(header.to_vec()), cap).expect_err("read too large");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn reader_loop_passes_bad_frames_through_and_stops_at_eof() {
        let mut data = Vec::new();
        write_frame(&mut data, b"not json", WIDGET_TO_HOST_CAP).expect("frame write");
        write_frame(&mut data, br#"{"type":"PLAY_SOUND"}"#, WIDGET_TO_HOST_CAP)
            .expect("frame write");

        let mut seen = Vec::new();
        reader_loop(Cursor::new(data), |text| {
            seen.push(text);
            true
        })
        .expect("reader loop");

        assert_eq!(seen, vec!["not json".to_string(), r#"{"type":"PLAY_SOUND"}"#.to_string()]);
    }

    #[test]
    fn decode_rejects_non_json_and_typeless_text() {
        for text in [
            "<html>",
            "",
            "[1,2]",
            r#"["OPEN_URL"]"#,
            r#"{"payload":{}}"#,
            r#"{"type":""}"#,
            r#"{"type":7}"#,
        ] {
            match decode(text) {
                Err(BridgeError::MalformedEnvelope { .. }) => {}
                other => panic!("expected malformed envelope for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn decode_treats_null_payload_as_absent() {
        let envelope = decode(r#"{"type":"REQUEST_INITIALIZATION","payload":null}"#)
            .expect("decode envelope");
        assert_eq!(envelope, Envelope::new(kind::REQUEST_INITIALIZATION, None));
    }

    #[test]
    fn typed_envelope_with_empty_type_is_rejected() {
        assert!(Envelope::new(" ", None).validated().is_err());
        assert!(Envelope::new(kind::OPEN_URL, None).validated().is_ok());
    }

    #[test]
    fn encodes_full_experience_initialize_without_ids() {
        let text = encode(&HostCommand::Initialize {
            auth_token: token(),
            target: LaunchTarget::FullExperience,
        })
        .expect("encode initialize");

        let value: Value = serde_json::from_str(&text).expect("parse encoded json");
        assert_eq!(value["type"], "INITIALIZE");
        assert_eq!(value["payload"]["user_auth_token"], "tok-123");
        assert_eq!(value["payload"]["widget_type"], "full_experience");
        assert!(value["payload"].get("module_id").is_none());
        assert!(value["payload"].get("skill_id").is_none());
    }

    #[test]
    fn encodes_deep_link_initialize_with_single_id() {
        let text = encode(&HostCommand::Initialize {
            auth_token: token(),
            target: LaunchTarget::skill("77"),
        })
        .expect("encode initialize");

        let value: Value = serde_json::from_str(&text).expect("parse encoded json");
        assert_eq!(value["payload"]["widget_type"], "deep_link");
        assert_eq!(value["payload"]["skill_id"], "77");
        assert!(value["payload"].get("module_id").is_none());
    }

    #[test]
    fn redacted_envelope_hides_token() {
        let command = HostCommand::Initialize {
            auth_token: token(),
            target: LaunchTarget::FullExperience,
        };
        let redacted = command
            .to_redacted_envelope()
            .and_then(|envelope| envelope.to_text())
            .expect("redacted text");
        assert!(!redacted.contains("tok-123"));
        assert!(redacted.contains(REDACTED));

        let live = command.to_envelope().expect("envelope");
        assert_eq!(live.payload.expect("payload")["user_auth_token"], "tok-123");
    }

    #[test]
    fn encodes_custom_css_with_null_counterpart() {
        let inline = command_payload(&HostCommand::CustomCss {
            source: CssSource::Inline("body{}".into()),
            priority: ThemePriority::Inline,
        });
        assert_eq!(inline, json!({ "css": "body{}", "url": null, "priority": "inline" }));

        let by_url = command_payload(&HostCommand::CustomCss {
            source: CssSource::Url("https://cdn.test/a.css".into()),
            priority: ThemePriority::Url,
        });
        assert_eq!(
            by_url,
            json!({ "css": null, "url": "https://cdn.test/a.css", "priority": "url" })
        );
    }

    #[test]
    fn encodes_custom_sounds_list() {
        let payload = command_payload(&HostCommand::CustomSounds {
            sounds: vec![
                SoundOverride::new("achievement", "https://cdn.test/a.mp3"),
                SoundOverride::new("error", ""),
            ],
        });
        assert_eq!(
            payload,
            json!({ "sounds": [
                { "name": "achievement", "url": "https://cdn.test/a.mp3" },
                { "name": "error", "url": "" }
            ] })
        );
    }

    #[test]
    fn maps_inbound_types_to_messages() {
        let message = WidgetMessage::from_envelope(
            decode(r#"{"type":"EXIT_REQUESTED","payload":{"source":"end_of_module","score":3}}"#)
                .expect("decode exit"),
        );
        match message {
            WidgetMessage::ExitRequested(event) => {
                assert_eq!(event.source, ExitSource::EndOfModule);
                assert_eq!(event.extra["score"], 3);
            }
            other => panic!("expected exit, got {other:?}"),
        }

        let message = WidgetMessage::from_envelope(
            decode(r#"{"type":"CUSTOM_CSS_ERROR","payload":{"error":"bad selector"}}"#)
                .expect("decode css error"),
        );
        assert_eq!(
            message,
            WidgetMessage::CustomCssError {
                error: "bad selector".into()
            }
        );

        let message = WidgetMessage::from_envelope(
            decode(r#"{"type":"INITIALIZATION_COMPLETE","payload":{"config":{"theme":"x"}}}"#)
                .expect("decode complete"),
        );
        assert_eq!(
            message,
            WidgetMessage::InitializationComplete {
                config: json!({ "theme": "x" })
            }
        );

        let message = WidgetMessage::from_envelope(
            decode(r#"{"type":"OPEN_URL","payload":{"url":"https://example.com"}}"#)
                .expect("decode open url"),
        );
        assert_eq!(
            message,
            WidgetMessage::OpenUrl {
                url: Some("https://example.com".into())
            }
        );
    }

    #[test]
    fn unknown_types_are_kept_for_logging() {
        let message = WidgetMessage::from_envelope(Envelope::new("SCORE_UPDATED", Some(json!(1))));
        assert_eq!(message.kind(), "SCORE_UPDATED");
        assert!(matches!(message, WidgetMessage::Unknown { .. }));
    }

    #[test]
    fn error_payloads_fall_back_to_message_or_raw_text() {
        assert_eq!(describe_error(None), "unknown error");
        assert_eq!(describe_error(Some(&json!({ "message": "expired" }))), "expired");
        assert_eq!(describe_error(Some(&json!("plain"))), "plain");
        assert_eq!(describe_error(Some(&json!({ "code": 4 }))), r#"{"code":4}"#);
    }

    fn command_payload(command: &HostCommand) -> Value {
        let text = encode(command).expect("encode command");
        let value: Value = serde_json::from_str(&text).expect("parse encoded json");
        value["payload"].clone()
    }
}
