use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;

use super::downloader::{FetchFailure, PageFetcher};

/// 按地址预先排好响应的假下载器，记录请求顺序
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<Bytes, FetchFailure>>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn ok(&self, url: &str, body: &[u8]) {
        self.push(url, Ok(Bytes::copy_from_slice(body)));
    }

    pub fn page(&self, url: &str, html: &str) {
        self.ok(url, html.as_bytes());
    }

    pub fn fail(&self, url: &str, failure: FetchFailure) {
        self.push(url, Err(failure));
    }

    fn push(&self, url: &str, response: Result<Bytes, FetchFailure>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchFailure> {
        self.requests.lock().unwrap().push(url.to_string());

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(url) else {
            return Err(FetchFailure::Request(format!("unscripted url {}", url)));
        };
        // 最后一个响应一直复用，方便页面被多次请求
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Err(FetchFailure::Status(500)))
        } else {
            queue.front().cloned().unwrap_or(Err(FetchFailure::Status(500)))
        }
    }
}
