use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::{RegistryAck, VehicleRegistry};
use crate::vehicle::{Observation, Record};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Registry reached over its REST interface.
///
/// Candidates are read page by page from
/// `GET {base}/vehicles/getVehiclesByCameraId/{camera}`; a 404 means the
/// registry has no vehicles for that camera yet.
pub struct HttpRegistry {
    base: Url,
    token: Option<String>,
    page_size: usize,
    agent: ureq::Agent,
}

impl HttpRegistry {
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("parse registry url {}", base))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "registry url must use http or https (got {})",
                base.scheme()
            ));
        }
        if base.cannot_be_a_base() {
            return Err(anyhow!("registry url {} cannot carry a path", base));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build();
        Ok(Self {
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            page_size: DEFAULT_PAGE_SIZE,
            agent,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("registry url {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let request = self
            .agent
            .request_url(method, url)
            .set("Accept", "application/json");
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    fn fetch_page(&self, camera_id: &str, page: usize) -> Result<Option<Vec<Record>>> {
        let mut url = self.endpoint(&["vehicles", "getVehiclesByCameraId", camera_id])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &self.page_size.to_string());

        match self.request("GET", &url).call() {
            Ok(response) => {
                let body = response.into_string().context("read registry response")?;
                let records: Vec<Record> = serde_json::from_str(&body)
                    .with_context(|| format!("decode vehicles for camera {}", camera_id))?;
                Ok(Some(records))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(anyhow!(
                    "registry returned {} for camera {}: {}",
                    code,
                    camera_id,
                    body.trim()
                ))
            }
            Err(e) => Err(anyhow!("registry unreachable: {}", e)),
        }
    }
}

impl VehicleRegistry for HttpRegistry {
    fn name(&self) -> &'static str {
        "http"
    }

    fn candidates(&mut self, camera_id: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page = 0;
        loop {
            let batch = match self.fetch_page(camera_id, page)? {
                Some(batch) => batch,
                None if page == 0 => {
                    log::debug!("registry has no vehicles for camera {}", camera_id);
                    break;
                }
                None => break,
            };
            let short = batch.len() < self.page_size;
            records.extend(batch);
            if short {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    fn create(&mut self, observation: &Observation) -> Result<RegistryAck> {
        let url = self.endpoint(&["vehicles", "create"])?;
        let body = serde_json::to_string(observation)?;
        let response = self
            .request("POST", &url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| anyhow!("registry create failed: {}", e))?;
        let body = response.into_string().context("read create response")?;
        let record: Record = serde_json::from_str(&body).context("decode created vehicle")?;
        Ok(RegistryAck::Created(record))
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(anyhow!("cannot update a vehicle without an id"));
        }
        let url = self.endpoint(&["vehicles", "update", &record.id])?;
        let body = serde_json::to_string(record)?;
        self.request("PUT", &url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| anyhow!("registry update of {} failed: {}", record.id, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Answers one request per scripted response and reports each request
    /// line plus body.
    fn serve(responses: Vec<(u16, String)>) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(value) = lower.strip_prefix("content-length:") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();
                let _ = tx.send((
                    request_line.trim().to_string(),
                    String::from_utf8_lossy(&request_body).into_owned(),
                ));
                write!(
                    stream,
                    "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
            }
        });
        (base, rx)
    }

    fn vehicle_json(id: &str) -> String {
        format!(
            r#"{{"id": "{}", "cameraId": "cam-1", "type": "car", "manufacturer": "Kia",
                "color": "red", "typeProb": 0.8, "manufacturerProb": null, "colorProb": null,
                "imageUrl": null, "description": null, "timestamp": "2025-07-30T10:00:00",
                "stayDuration": null, "stayDurationFormatted": null,
                "top": 1, "left": 2, "width": 30, "height": 40,
                "latitude": null, "longitude": null}}"#,
            id
        )
    }

    fn page(ids: &[&str]) -> String {
        let items: Vec<String> = ids.iter().map(|id| vehicle_json(id)).collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn not_found_means_no_vehicles_yet() {
        let (base, requests) = serve(vec![(404, String::new())]);
        let mut registry = HttpRegistry::new(&base, None).unwrap();
        let records = registry.candidates("cam-1").unwrap();
        assert!(records.is_empty());
        let (line, _) = requests.recv().unwrap();
        assert_eq!(
            line,
            "GET /vehicles/getVehiclesByCameraId/cam-1?page=0&size=100 HTTP/1.1"
        );
    }

    #[test]
    fn server_error_aborts_the_fetch() {
        let (base, _requests) = serve(vec![(500, r#"{"error": "db down"}"#.to_string())]);
        let mut registry = HttpRegistry::new(&base, None).unwrap();
        let err = registry.candidates("cam-1").unwrap_err();
        assert!(err.to_string().contains("500"), "{}", err);
    }

    #[test]
    fn pages_are_read_until_a_short_page() {
        let (base, requests) = serve(vec![
            (200, page(&["a", "b"])),
            (200, page(&["c"])),
        ]);
        let mut registry = HttpRegistry::new(&base, None).unwrap().with_page_size(2);
        let records = registry.candidates("cam-1").unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(records.iter().all(|r| r.timestamp.is_some()));

        let lines: Vec<String> = requests.try_iter().map(|(line, _)| line).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("page=0&size=2"));
        assert!(lines[1].contains("page=1&size=2"));
    }

    #[test]
    fn not_found_after_a_full_page_ends_paging() {
        let (base, _requests) = serve(vec![(200, page(&["a", "b"])), (404, String::new())]);
        let mut registry = HttpRegistry::new(&base, None).unwrap().with_page_size(2);
        let records = registry.candidates("cam-1").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn create_decodes_the_stored_vehicle() {
        let (base, requests) = serve(vec![(200, vehicle_json("66a8c1f0"))]);
        let mut registry = HttpRegistry::new(&base, Some("secret".into())).unwrap();
        let observation = Observation::new(crate::vehicle::VehicleAttributes {
            kind: "car".into(),
            manufacturer: "Kia".into(),
            color: "red".into(),
            camera_id: "cam-1".into(),
            ..Default::default()
        });
        match registry.create(&observation).unwrap() {
            RegistryAck::Created(record) => {
                assert_eq!(record.id, "66a8c1f0");
                assert_eq!(record.attributes.manufacturer_confidence, 0.0);
            }
            other => panic!("unexpected ack: {:?}", other),
        }
        let (line, body) = requests.recv().unwrap();
        assert_eq!(line, "POST /vehicles/create HTTP/1.1");
        assert!(body.contains(r#""manufacturer":"Kia""#), "{}", body);
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpRegistry::new("ftp://registry", None).is_err());
        assert!(HttpRegistry::new("not a url", None).is_err());
    }

    #[test]
    fn endpoint_escapes_camera_ids() {
        let registry = HttpRegistry::new("http://registry:8080/api/", None).unwrap();
        let url = registry
            .endpoint(&["vehicles", "getVehiclesByCameraId", "gate 1/north"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://registry:8080/api/vehicles/getVehiclesByCameraId/gate%201%2Fnorth"
        );
    }

    #[test]
    fn blank_token_is_ignored() {
        let registry = HttpRegistry::new("http://registry", Some("  ".into())).unwrap();
        assert!(registry.token.is_none());
    }
}
