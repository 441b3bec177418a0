use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::{ParamValue, WorkerBinary};

/// One task as the worker reports it in the /status map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRecord {
    pub status: i64,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordRequest {
    #[serde(rename = "youtubeID")]
    pub youtube_id: String,
    pub quality: String,
    pub binary: String,
    pub params: BTreeMap<String, ParamValue>,
    pub callbacks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: String,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    id: &'a str,
}

/// Blocking HTTP boundary to the download worker.
#[derive(Clone)]
pub struct WorkerClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl WorkerClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn status(&self) -> Result<BTreeMap<String, TaskRecord>> {
        let res = self
            .http
            .get(self.url("/status"))
            .send()
            .map_err(|e| Error::msg(format!("status fetch failed: {e}")))?;
        if !res.status().is_success() {
            return Err(error_from_response(res));
        }
        res.json::<BTreeMap<String, TaskRecord>>()
            .map_err(|e| Error::msg(format!("status body unreadable: {e}")))
    }

    /// Submits one download; returns the new task id.
    pub fn record(&self, req: &RecordRequest) -> Result<String> {
        let res = self
            .http
            .post(self.url("/record"))
            .json(req)
            .send()
            .map_err(|e| Error::msg(format!("submission failed: {e}")))?;
        if !res.status().is_success() {
            return Err(error_from_response(res));
        }
        let body: RecordResponse = res
            .json()
            .map_err(|e| Error::msg(format!("submission response unreadable: {e}")))?;
        Ok(body.id)
    }

    pub fn delete_task(&self, uid: &str) -> Result<()> {
        let res = self
            .http
            .delete(self.url("/status"))
            .json(&DeleteBody { id: uid })
            .send()
            .map_err(|e| Error::msg(format!("delete request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(error_from_response(res));
        }
        Ok(())
    }

    /// Post-completion hook identifiers. A worker without the endpoint
    /// answers 404, which simply means "no callbacks available".
    pub fn callbacks(&self) -> Result<Vec<String>> {
        let res = self
            .http
            .get(self.url("/callbacks"))
            .send()
            .map_err(|e| Error::msg(format!("callbacks fetch failed: {e}")))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !res.status().is_success() {
            return Err(error_from_response(res));
        }
        res.json::<Vec<String>>()
            .map_err(|e| Error::msg(format!("callbacks body unreadable: {e}")))
    }

    /// Asks the worker to update one of its download binaries; returns the
    /// worker's confirmation message.
    pub fn update_binary(&self, binary: WorkerBinary) -> Result<String> {
        let path = match binary {
            WorkerBinary::Ytdlp => "/update-ytdlp",
            WorkerBinary::Ytarchive => "/update-ytarchive",
        };
        let res = self
            .http
            .post(self.url(path))
            .send()
            .map_err(|e| Error::msg(format!("update request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(error_from_response(res));
        }
        let body: MessageBody = res
            .json()
            .map_err(|e| Error::msg(format!("update response unreadable: {e}")))?;
        Ok(body.message)
    }
}

// Server-reported failures carry a `detail` message which is surfaced
// verbatim; anything else falls back to the status line.
fn error_from_response(res: reqwest::blocking::Response) -> Error {
    let status = res.status();
    match res.text() {
        Ok(body) => match serde_json::from_str::<DetailBody>(&body) {
            Ok(d) => Error::msg(d.detail),
            Err(_) => Error::msg(format!("request failed with status {status}")),
        },
        Err(_) => Error::msg(format!("request failed with status {status}")),
    }
}
