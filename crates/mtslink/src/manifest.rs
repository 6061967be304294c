//! Manifest Resolver: builds the record endpoint URL, fetches it, and turns the
//! JSON body into a [`Manifest`].

use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{ACCESS_DENIED_CODE, ManifestError};

/// Cookie carrying the caller's session credential.
const SESSION_COOKIE: &str = "sessionId";

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "weba", "flac",
];

/// Track a segment contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    fn from_declared(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    fn from_url(url: &str) -> Self {
        let extension = file_extension(url).map(|ext| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => Self::Audio,
            _ => Self::Video,
        }
    }
}

fn file_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

/// One downloadable unit of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Position in the manifest's segment collection
    pub index: usize,
    pub url: String,
    pub kind: TrackKind,
    /// Declared duration in seconds, 0 when the manifest gives none
    pub duration: f64,
}

/// Parsed description of a recording. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    /// `None` when the body carried no segment collection at all.
    pub segments: Option<Vec<Segment>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    name: Option<Value>,
    event_logs: Option<Vec<Value>>,
}

impl Manifest {
    /// Build a manifest from an already-decoded JSON body.
    pub fn from_value(body: Value) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_value(body)
            .map_err(|e| ManifestError::invalid(format!("unexpected body shape: {e}")))?;

        let name = match raw.name {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => return Err(ManifestError::invalid("missing name field")),
        };

        let segments = raw.event_logs.map(|events| {
            events
                .iter()
                .filter_map(segment_source)
                .enumerate()
                .map(|(index, (url, kind, duration))| Segment {
                    index,
                    url,
                    kind,
                    duration,
                })
                .collect()
        });

        Ok(Self { name, segments })
    }

    pub fn segment_count(&self) -> usize {
        self.segments.as_ref().map_or(0, Vec::len)
    }
}

/// Extract `(url, kind, duration)` from an event log entry. Entries without a
/// `data.url` are other webinar events and are not segments.
fn segment_source(event: &Value) -> Option<(String, TrackKind, f64)> {
    let data = event.get("data")?.as_object()?;
    let url = data.get("url")?.as_str()?.trim();
    if url.is_empty() {
        return None;
    }

    let declared = data
        .get("kind")
        .or_else(|| data.get("type"))
        .and_then(Value::as_str)
        .and_then(TrackKind::from_declared);
    let kind = match (declared, data.get("hasVideo").and_then(Value::as_bool)) {
        (Some(kind), _) => kind,
        (None, Some(false)) => TrackKind::Audio,
        (None, _) => TrackKind::from_url(url),
    };

    let duration = data
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Some((url.to_string(), kind, duration))
}

/// Build the record endpoint for a session, or for one recording of it when
/// `recording_id` is non-empty. Both forms ask the service to apply cuts.
pub fn build_manifest_url(
    base_url: &str,
    session_id: &str,
    recording_id: &str,
) -> Result<Url, ManifestError> {
    let session_id = session_id.trim();
    let recording_id = recording_id.trim();
    if session_id.is_empty() {
        return Err(ManifestError::invalid_input(
            "missing webinar event session ID",
        ));
    }

    let mut url = Url::parse(base_url)
        .map_err(|e| ManifestError::invalid_input(format!("invalid base URL `{base_url}`: {e}")))?;

    {
        let Ok(mut path) = url.path_segments_mut() else {
            return Err(ManifestError::invalid_input(format!(
                "base URL `{base_url}` cannot carry a path"
            )));
        };
        path.pop_if_empty();
        if recording_id.is_empty() {
            path.extend(["api", "eventsessions", session_id, "record"]);
        } else {
            path.extend([
                "api",
                "event-sessions",
                session_id,
                "record-files",
                recording_id,
                "flow",
            ]);
        }
    }
    url.query_pairs_mut().append_pair("withoutCuts", "false");

    Ok(url)
}

/// Outcome of a manifest request, decided before committing to the
/// manifest schema.
#[derive(Debug)]
enum ManifestResponse {
    /// Body is an `{ "error": { "code": .. } }` envelope.
    ApiError { code: i64 },
    /// Non-2xx status without a recognised error envelope.
    Status(StatusCode),
    /// 2xx with a JSON body.
    Body(Value),
}

impl ManifestResponse {
    fn classify(status: StatusCode, body: &[u8]) -> Result<Self, serde_json::Error> {
        let parsed = serde_json::from_slice::<Value>(body);

        let code = parsed.as_ref().ok().and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("code"))
                .and_then(Value::as_i64)
        });
        if let Some(code) = code {
            return Ok(Self::ApiError { code });
        }

        if !status.is_success() {
            return Ok(Self::Status(status));
        }

        parsed.map(Self::Body)
    }
}

/// Interpret a manifest response body.
///
/// An error envelope with code 403 means the recording needs a session
/// credential and wins over the HTTP status.
pub fn parse_manifest_response(
    url: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<Manifest, ManifestError> {
    let response = ManifestResponse::classify(status, body).map_err(|source| {
        ManifestError::Parse {
            url: url.to_string(),
            source,
        }
    })?;

    match response {
        ManifestResponse::ApiError { code } if code == ACCESS_DENIED_CODE => {
            Err(ManifestError::AccessDenied {
                url: url.to_string(),
            })
        }
        ManifestResponse::ApiError { code } if !status.is_success() => {
            debug!(code, %status, "API error envelope on failed request");
            Err(ManifestError::HttpStatus {
                status,
                url: url.to_string(),
            })
        }
        ManifestResponse::ApiError { code } => Err(ManifestError::invalid(format!(
            "API returned error code {code}"
        ))),
        ManifestResponse::Status(status) => Err(ManifestError::HttpStatus {
            status,
            url: url.to_string(),
        }),
        ManifestResponse::Body(value) => Manifest::from_value(value),
    }
}

/// Fetches and parses recording manifests.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    client: Client,
}

impl ManifestResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issue a single GET for the manifest. No retries: the caller re-runs the
    /// whole pipeline if needed.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        session_credential: Option<&str>,
    ) -> Result<Manifest, ManifestError> {
        let mut request = self.client.get(url.clone());

        if let Some(credential) = session_credential.map(str::trim).filter(|c| !c.is_empty()) {
            let cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={credential}"))
                .map_err(|_| {
                    ManifestError::invalid_input("session credential contains invalid characters")
                })?;
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(%status, bytes = body.len(), "Manifest response received");

        let manifest = parse_manifest_response(url.as_str(), status, &body);
        match &manifest {
            Ok(manifest) => info!(
                name = %manifest.name,
                segments = manifest.segment_count(),
                "Manifest resolved"
            ),
            Err(e) if e.is_access_denied() => warn!("Manifest requires a session credential"),
            Err(_) => {}
        }
        manifest
    }
}
