//! Harvester facade over the arXiv OAI-PMH repository.
//!
//! [`ArxivOaiHarvester`] sends requests, honors the repository's flow control,
//! and decodes responses into typed records. Calls take `&mut self`, so one
//! harvester never has two requests in flight; the spacing between requests is
//! measured from the last response received.

pub mod flow_control;
pub mod mock;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::HarvesterConfig;
use crate::error::HarvestError;
use crate::models::{
    GetRecordRequest, GetRecordResponse, ListRecordsRequest, ListRecordsResponse, OaiRequest,
    ResumeListRecordsRequest,
};
use crate::xml::{ParsedXmlResponse, XmlParser};

pub use crate::models::DEFAULT_BASE_URL;
pub use flow_control::{pause, FlowControl};
pub use mock::{MockTransport, RecordedRequest};
pub use transport::{RawResponse, RequestHeaders, ReqwestTransport, Transport, DEFAULT_USER_AGENT};

/// Result of a single attempt
#[derive(Debug)]
enum Attempt {
    Complete(ParsedXmlResponse),
    /// The repository is busy and suggested a wait
    RetryAfter(Duration),
}

/// Client for the arXiv OAI-PMH repository
#[derive(Debug)]
pub struct ArxivOaiHarvester {
    transport: Arc<dyn Transport>,
    parser: XmlParser,
    flow: FlowControl,
    base_url: Url,
    headers: RequestHeaders,
    last_response_received: Option<Instant>,
    cancel: CancellationToken,
}

impl ArxivOaiHarvester {
    /// Create a harvester for the public repository with default settings
    pub fn new() -> Result<Self, HarvestError> {
        Self::from_config(&HarvesterConfig::default())
    }

    /// Create a harvester from loaded configuration
    pub fn from_config(config: &HarvesterConfig) -> Result<Self, HarvestError> {
        let transport = ReqwestTransport::from_config(config)?;
        let mut harvester =
            Self::with_transport(Arc::new(transport), &config.base_url, config.flow_control()?)?;
        harvester.headers = RequestHeaders {
            user_agent: config.user_agent.clone(),
            from: config.from.clone(),
        };
        Ok(harvester)
    }

    /// Create a harvester over any transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        base_url: &str,
        flow: FlowControl,
    ) -> Result<Self, HarvestError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            HarvestError::InvalidRequest(format!("Invalid base URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            transport,
            parser: XmlParser::new(),
            flow,
            base_url,
            headers: RequestHeaders::default(),
            last_response_received: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Send this `User-Agent` with every request
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.headers.user_agent = Some(user_agent.into());
        self
    }

    /// Send this contact address as `From` with every request
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.headers.from = Some(from.into());
        self
    }

    /// Use a caller-owned token to interrupt waits
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_user_agent(&mut self, user_agent: Option<String>) {
        self.headers.user_agent = user_agent;
    }

    pub fn set_from(&mut self, from: Option<String>) {
        self.headers.from = from;
    }

    /// Token that interrupts any spacing or retry wait when cancelled.
    ///
    /// An interrupted wait ends only the call that was waiting. The harvester
    /// then installs a fresh token, so fetch it again to interrupt later calls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn flow_control(&self) -> &FlowControl {
        &self.flow
    }

    /// When the last response was received, if any
    pub fn last_response_received(&self) -> Option<Instant> {
        self.last_response_received
    }

    /// Fetch a single record.
    ///
    /// A record the repository does not have (`idDoesNotExist`) yields a
    /// response with no record.
    pub async fn get_record(
        &mut self,
        request: &GetRecordRequest,
    ) -> Result<GetRecordResponse, HarvestError> {
        let parsed = self.execute(request).await?;

        let mut records = parsed.records.into_iter();
        let record = records.next();
        if records.next().is_some() {
            tracing::warn!(
                "Repository returned more than one record for {}; keeping the first",
                request.identifier()
            );
        }

        Ok(GetRecordResponse {
            response_date: parsed.response_date,
            request: request.clone(),
            record,
        })
    }

    /// Fetch the first page of a datestamp range
    pub async fn list_records(
        &mut self,
        request: &ListRecordsRequest,
    ) -> Result<ListRecordsResponse, HarvestError> {
        let parsed = self.execute(request).await?;
        Ok(list_records_response(parsed, request.clone()))
    }

    /// Fetch a following page. The response reports the original request.
    pub async fn resume_list_records(
        &mut self,
        request: &ResumeListRecordsRequest,
    ) -> Result<ListRecordsResponse, HarvestError> {
        let parsed = self.execute(request).await?;
        Ok(list_records_response(
            parsed,
            request.original_request().clone(),
        ))
    }

    /// Send a request, waiting and retrying as the repository directs
    async fn execute<R>(&mut self, request: &R) -> Result<ParsedXmlResponse, HarvestError>
    where
        R: OaiRequest + Sync,
    {
        let uri = request.uri_for(&self.base_url);

        let since_last_response = self.last_response_received.map(|at| at.elapsed());
        if let Some(wait) = self.flow.spacing_wait(since_last_response) {
            tracing::info!(
                "Too soon since sending last request - waiting {} seconds...",
                wait.as_secs_f64()
            );
            self.wait(wait).await?;
        }

        let mut retries = 0;
        loop {
            match self.attempt(&uri).await? {
                Attempt::Complete(parsed) => {
                    if retries > 0 {
                        tracing::info!("Request succeeded after {} retries", retries);
                    }
                    return Ok(parsed);
                }
                Attempt::RetryAfter(suggested) => {
                    retries += 1;
                    if retries > self.flow.max_retries() {
                        tracing::warn!("Too many retries; aborting request {}", uri);
                        return Err(HarvestError::Timeout(format!(
                            "Too many retries; aborting request {}",
                            uri
                        )));
                    }

                    let wait = self.flow.retry_wait(suggested).inspect_err(|e| {
                        tracing::warn!("{}; aborting request {}", e, uri);
                    })?;
                    tracing::info!("Waiting {} seconds...", wait.as_secs_f64());
                    self.wait(wait).await?;
                }
            }
        }
    }

    /// Pause on the current token, replacing it once it has fired
    async fn wait(&mut self, duration: Duration) -> Result<(), HarvestError> {
        let result = pause(duration, &self.cancel).await;
        if matches!(result, Err(HarvestError::Interrupted(_))) {
            self.cancel = CancellationToken::new();
        }
        result
    }

    async fn attempt(&mut self, uri: &Url) -> Result<Attempt, HarvestError> {
        tracing::debug!("Sending request {}", uri);

        let response = self.transport.get(uri, &self.headers).await?;
        self.last_response_received = Some(Instant::now());

        if let Some(error) = &response.body_error {
            tracing::warn!("Failed to read response body from {}: {}", uri, error);
            return Err(HarvestError::Transport(format!(
                "Failed to read response body (status {}) from {}: {}",
                response.status, uri, error
            )));
        }

        match response.status {
            200 => {
                let parsed = self.parser.parse_bytes(&response.body).inspect_err(|e| {
                    tracing::warn!("Failed to decode response to {}: {}", uri, e);
                })?;
                tracing::debug!("Received {} records", parsed.records.len());
                Ok(Attempt::Complete(parsed))
            }
            503 => match response.retry_after_secs() {
                Some(seconds) => {
                    tracing::debug!("Repository asked to retry after {} seconds", seconds);
                    Ok(Attempt::RetryAfter(Duration::from_secs(seconds)))
                }
                None => Err(HarvestError::Repository(format!(
                    "Service unavailable without a usable Retry-After header ({:?}) for {}",
                    response.retry_after, uri
                ))),
            },
            302 => Err(HarvestError::UnsupportedRedirect(format!(
                "{} redirected to {}",
                uri,
                response.location.as_deref().unwrap_or("an unknown location")
            ))),
            404 => Err(HarvestError::Repository(format!(
                "No repository found at {}",
                uri
            ))),
            status => Err(HarvestError::Repository(format!(
                "Unexpected status {} for {}: {}",
                status,
                uri,
                String::from_utf8_lossy(&response.body)
            ))),
        }
    }
}

fn list_records_response(parsed: ParsedXmlResponse, request: ListRecordsRequest) -> ListRecordsResponse {
    ListRecordsResponse {
        response_date: parsed.response_date,
        request,
        records: parsed.records,
        resumption_token: parsed.resumption_token,
        cursor: parsed.cursor,
        complete_list_size: parsed.complete_list_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    const GET_RECORD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2015-01-06T13:51:59Z</responseDate>
<request verb="GetRecord">http://export.arxiv.org/oai2</request>
<GetRecord><record>
<header><identifier>oai:arXiv.org:1302.2146</identifier><datestamp>2013-02-12</datestamp><setSpec>physics:hep-ph</setSpec></header>
<metadata><arXivRaw xmlns="http://arxiv.org/OAI/arXivRaw/">
<id>1302.2146</id>
<version version="v1"><date>Fri, 8 Feb 2013 21:00:01 GMT</date><size>853kb</size><source_type>D</source_type></version>
<title>A Title</title>
<categories>hep-ph hep-ex</categories>
</arXivRaw></metadata>
</record></GetRecord>
</OAI-PMH>"#;

    const ID_DOES_NOT_EXIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2015-01-06T13:51:59Z</responseDate>
<request verb="GetRecord">http://export.arxiv.org/oai2</request>
<error code="idDoesNotExist">Malformed identifier</error>
</OAI-PMH>"#;

    fn list_page(identifier: &str, token: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2015-06-28T02:04:11Z</responseDate>
<ListRecords>
<record><header><identifier>{}</identifier><datestamp>2015-06-27</datestamp></header>
<metadata><arXivRaw><title>Page record</title></arXivRaw></metadata></record>
<resumptionToken cursor="0" completeListSize="2">{}</resumptionToken>
</ListRecords>
</OAI-PMH>"#,
            identifier, token
        )
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn harvester(mock: &Arc<MockTransport>, flow: FlowControl) -> ArxivOaiHarvester {
        ArxivOaiHarvester::with_transport(mock.clone(), DEFAULT_BASE_URL, flow).unwrap()
    }

    fn request() -> GetRecordRequest {
        GetRecordRequest::new("1302.2146").unwrap()
    }

    #[test]
    fn test_invalid_base_url() {
        let mock = Arc::new(MockTransport::new());
        let result = ArxivOaiHarvester::with_transport(mock, "not a url", FlowControl::default());
        assert!(matches!(result, Err(HarvestError::InvalidRequest(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_record() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let response = harvester.get_record(&request()).await.unwrap();
        let record = response.record.expect("a record");

        assert_eq!(record.identifier, "oai:arXiv.org:1302.2146");
        assert_eq!(record.primary_category(), Some("hep-ph"));
        assert_eq!(response.request, request());
        assert!(harvester.last_response_received().is_some());

        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].uri.as_str(),
            "http://export.arxiv.org/oai2?verb=GetRecord&metadataPrefix=arXivRaw&identifier=oai%3AarXiv.org%3A1302.2146"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_record_missing() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(ID_DOES_NOT_EXIST);
        let mut harvester = harvester(&mock, FlowControl::default());

        let response = harvester.get_record(&request()).await.unwrap();
        assert!(response.record.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_padded_waits() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(20);
        mock.push_retry_after(20);
        mock.push_ok(GET_RECORD);
        let flow = FlowControl::new(3, secs(10), secs(300), 1.1).unwrap();
        let mut harvester = harvester(&mock, flow);

        let start = Instant::now();
        let response = harvester.get_record(&request()).await.unwrap();

        assert!(response.record.is_some());
        assert_eq!(mock.attempts(), 3);
        assert_eq!(start.elapsed(), secs(44));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_then_mid_range_suggestions() {
        let mock = Arc::new(MockTransport::new());
        // Just under the minimum, then halfway between minimum and maximum
        mock.push_retry_after(9);
        mock.push_retry_after(155);
        mock.push_ok(GET_RECORD);
        let flow = FlowControl::new(3, secs(10), secs(300), 1.1).unwrap();
        let mut harvester = harvester(&mock, flow);

        let start = Instant::now();
        let response = harvester.get_record(&request()).await.unwrap();

        assert!(response.record.is_some());
        assert_eq!(mock.attempts(), 3);
        // 10s floor, then 155s padded to 170.5s
        assert_eq!(start.elapsed(), Duration::from_millis(180_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_suggestion_raised_to_min_wait() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(1);
        mock.push_ok(GET_RECORD);
        let flow = FlowControl::new(3, secs(10), secs(300), 1.1).unwrap();
        let mut harvester = harvester(&mock, flow);

        let start = Instant::now();
        harvester.get_record(&request()).await.unwrap();
        assert_eq!(start.elapsed(), secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suggested_wait_too_long() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(600);
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let start = Instant::now();
        let err = harvester.get_record(&request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(mock.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_retries() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..5 {
            mock.push_retry_after(1);
        }
        let flow = FlowControl::new(2, secs(1), secs(60), 1.0).unwrap();
        let mut harvester = harvester(&mock, flow);

        let err = harvester.get_record(&request()).await.unwrap_err();
        assert!(matches!(err, HarvestError::Timeout(_)));
        assert_eq!(mock.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(1);
        let flow = FlowControl::new(0, secs(1), secs(60), 1.0).unwrap();
        let mut harvester = harvester(&mock, flow);

        assert!(harvester.get_record(&request()).await.is_err());
        assert_eq!(mock.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_throttle_failures_are_not_retried() {
        let failures = vec![
            (RawResponse::new(302, "").with_location("http://elsewhere"), ErrorKind::UnsupportedRedirect),
            (RawResponse::new(404, "missing"), ErrorKind::Repository),
            (RawResponse::new(500, "oops"), ErrorKind::Repository),
            (RawResponse::new(503, ""), ErrorKind::Repository),
            (RawResponse::new(200, "<html>not oai</html>"), ErrorKind::Repository),
        ];

        for (response, kind) in failures {
            let mock = Arc::new(MockTransport::new());
            let status = response.status;
            mock.push_response(response);
            mock.push_ok(GET_RECORD);
            let mut harvester = harvester(&mock, FlowControl::default());

            let err = harvester.get_record(&request()).await.unwrap_err();
            assert_eq!(err.kind(), kind, "status {}", status);
            assert_eq!(mock.attempts(), 1, "status {}", status);
            assert_eq!(mock.remaining(), 1, "status {}", status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_error(HarvestError::Transport("connection refused".to_string()));
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let err = harvester.get_record(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(mock.attempts(), 1);
        assert_eq!(mock.remaining(), 1);
        assert!(harvester.last_response_received().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_body_still_spaces_next_request() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(RawResponse::new(200, "<OAI-PMH>").with_body_error("connection closed"));
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let start = Instant::now();
        let err = harvester.get_record(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(harvester.last_response_received().is_some());

        harvester.get_record(&request()).await.unwrap();
        assert_eq!(mock.attempts(), 2);
        assert_eq!(start.elapsed(), secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_between_requests() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(GET_RECORD);
        mock.push_ok(GET_RECORD);
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let start = Instant::now();
        harvester.get_record(&request()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        harvester.get_record(&request()).await.unwrap();
        assert_eq!(start.elapsed(), secs(10));

        // Only the remainder of the spacing is waited
        tokio::time::sleep(secs(4)).await;
        harvester.get_record(&request()).await.unwrap();
        assert_eq!(start.elapsed(), secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_measured_from_error_response() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(RawResponse::new(404, ""));
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let start = Instant::now();
        assert!(harvester.get_record(&request()).await.is_err());
        harvester.get_record(&request()).await.unwrap();
        assert_eq!(start.elapsed(), secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(20);
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let cancel = harvester.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let err = harvester.get_record(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert_eq!(mock.attempts(), 1);
        assert!(start.elapsed() < secs(22));
    }

    #[tokio::test(start_paused = true)]
    async fn test_usable_after_interrupted_wait() {
        let mock = Arc::new(MockTransport::new());
        mock.push_retry_after(20);
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default());

        let first_token = harvester.cancellation_token();
        let cancel = first_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            cancel.cancel();
        });

        let err = harvester.get_record(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);

        let fresh_token = harvester.cancellation_token();
        assert!(first_token.is_cancelled());
        assert!(!fresh_token.is_cancelled());

        // The next call waits out the spacing and is sent
        tokio::time::sleep(secs(2)).await;
        let response = harvester.get_record(&request()).await.unwrap();
        assert!(response.record.is_some());
        assert_eq!(mock.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identification_headers() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(GET_RECORD);
        let mut harvester = harvester(&mock, FlowControl::default())
            .with_user_agent("test-agent/1.0")
            .with_from("me@example.com");

        harvester.get_record(&request()).await.unwrap();

        let sent = mock.requests();
        assert_eq!(sent[0].headers.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(sent[0].headers.from.as_deref(), Some("me@example.com"));

        harvester.set_from(None);
        assert!(harvester.headers.from.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_and_resume() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(list_page("oai:arXiv.org:1506.08001", "870434|1001"));
        mock.push_ok(list_page("oai:arXiv.org:1506.08002", ""));
        let mut harvester = harvester(&mock, FlowControl::default());

        let original = ListRecordsRequest::new(
            NaiveDate::from_ymd_opt(2015, 6, 27),
            None,
            Some("physics:hep-ph".to_string()),
        )
        .unwrap();

        let first = harvester.list_records(&original).await.unwrap();
        assert_eq!(first.records.len(), 1);
        assert_eq!(first.cursor, Some(0));
        let next = first.resumption().expect("a second page");

        let second = harvester.resume_list_records(&next).await.unwrap();
        assert_eq!(second.request, original);
        assert_eq!(second.records[0].identifier, "oai:arXiv.org:1506.08002");
        assert!(second.resumption().is_none());

        let sent = mock.requests();
        assert_eq!(
            sent[0].uri.query(),
            Some("verb=ListRecords&metadataPrefix=arXivRaw&from=2015-06-27&set=physics%3Ahep-ph")
        );
        assert_eq!(
            sent[1].uri.query(),
            Some("verb=ListRecords&resumptionToken=870434%7C1001")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_resumption_token() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(
            r#"<OAI-PMH><responseDate>2015-06-28T02:04:11Z</responseDate>
<error code="badResumptionToken">The value of the resumptionToken argument is invalid or expired.</error></OAI-PMH>"#,
        );
        let mut harvester = harvester(&mock, FlowControl::default());

        let resume = ResumeListRecordsRequest::new("stale", ListRecordsRequest::default());
        let err = harvester.resume_list_records(&resume).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadResumptionToken);
        assert!(err.is_caller_error());
    }
}
