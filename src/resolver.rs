//! DNS query resolution logic.
//!
//! Handles the per-datagram pipeline:
//! 1. Decode the request (malformed input is dropped, never echoed)
//! 2. Look every question up in the record store
//! 3. Answer from the store when all questions hit, otherwise forward the
//!    original bytes upstream, cache the reply's answers and relay it
//!
//! Transports handle the actual I/O, resolver handles decisions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::RecordStore;
use crate::dns::{Message, Question, Record, rcode};
use crate::error::{Error, Result};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::Upstream;

/// What to do with a received datagram.
#[derive(Debug)]
pub enum Outcome {
    /// Every question was answered from the record store.
    Cached(Vec<u8>),
    /// The request went upstream; this is the reply to relay.
    Forwarded(Vec<u8>),
    /// The upstream round-trip failed. Carries a SERVFAIL response when
    /// the resolver is configured to send one, otherwise nothing is sent.
    UpstreamFailed(Option<Vec<u8>>),
    /// Nothing is sent back.
    Dropped,
}

impl Outcome {
    /// Bytes to send back to the client, if any.
    pub fn response(&self) -> Option<&[u8]> {
        match self {
            Outcome::Cached(bytes) | Outcome::Forwarded(bytes) => Some(bytes),
            Outcome::UpstreamFailed(bytes) => bytes.as_deref(),
            Outcome::Dropped => None,
        }
    }

    pub fn into_response(self) -> Option<Vec<u8>> {
        match self {
            Outcome::Cached(bytes) | Outcome::Forwarded(bytes) => Some(bytes),
            Outcome::UpstreamFailed(bytes) => bytes,
            Outcome::Dropped => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Cached(_) => "CACHED",
            Outcome::Forwarded(_) => "FORWARDED",
            Outcome::UpstreamFailed(_) => "UPSTREAM_FAILED",
            Outcome::Dropped => "DROPPED",
        }
    }
}

/// Resolver ties the codec, the record store and the upstream together.
///
/// Shared by reference across concurrent handlers; the record store is
/// the only mutable state.
pub struct Resolver<U> {
    store: Arc<RecordStore>,
    upstream: U,
    stats: Stats,
    servfail_on_upstream_error: bool,
}

impl<U: Upstream> Resolver<U> {
    /// Create a resolver answering from `store` and forwarding misses to
    /// `upstream`.
    pub fn new(store: Arc<RecordStore>, upstream: U) -> Self {
        Self {
            store,
            upstream,
            stats: Stats::new(),
            servfail_on_upstream_error: false,
        }
    }

    /// Answer SERVFAIL instead of staying silent when the upstream fails.
    pub fn with_servfail_on_upstream_error(mut self, enabled: bool) -> Self {
        self.servfail_on_upstream_error = enabled;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn cache_len(&self) -> usize {
        self.store.len()
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    /// Process one datagram received from a client.
    ///
    /// This is the main entry point for transports: call it with the raw
    /// request and send back whatever [`Outcome::response`] yields.
    pub async fn resolve(&self, datagram: &[u8]) -> Outcome {
        let start = Instant::now();
        let request = match Message::decode(datagram) {
            Ok(request) => request,
            Err(err) => {
                debug!(%err, len = datagram.len(), "dropping malformed request");
                self.stats.record_dropped();
                return Outcome::Dropped;
            }
        };

        let outcome = self.resolve_message(datagram, &request).await;
        let elapsed = start.elapsed();

        match &outcome {
            Outcome::Cached(_) => self.stats.record_cached(elapsed),
            Outcome::Forwarded(_) => self.stats.record_forwarded(elapsed),
            Outcome::UpstreamFailed(response) => self
                .stats
                .record_upstream_failure(elapsed, response.is_some()),
            Outcome::Dropped => self.stats.record_dropped(),
        }

        if let Some(question) = request.questions.first() {
            debug!(
                id = request.header.id,
                domain = %question.name,
                qtype = question.qtype,
                outcome = outcome.as_str(),
                total_ms = as_ms(elapsed),
                "query handled"
            );
        }

        outcome
    }

    async fn resolve_message(&self, datagram: &[u8], request: &Message) -> Outcome {
        if request.header.is_response() || request.questions.is_empty() {
            debug!(id = request.header.id, "dropping datagram that is not a query");
            return Outcome::Dropped;
        }

        let now = Instant::now();
        let mut answers = Vec::with_capacity(request.questions.len());
        let mut missing = Vec::new();
        for question in &request.questions {
            match self.store.lookup(question, now) {
                Some(record) => answers.push(record),
                None => missing.push(question),
            }
        }

        if missing.is_empty() {
            return match Message::build_response(request, answers).encode() {
                Ok(response) => Outcome::Cached(response),
                Err(err) => {
                    warn!(%err, id = request.header.id, "failed to encode cached response");
                    Outcome::Dropped
                }
            };
        }

        match self.forward(datagram, request, &missing).await {
            Ok(response) => Outcome::Forwarded(response),
            Err(err) => {
                warn!(
                    %err,
                    id = request.header.id,
                    upstream_error = err.is_upstream(),
                    "forwarding failed"
                );
                Outcome::UpstreamFailed(self.failure_response(request))
            }
        }
    }

    /// Send the request bytes upstream unchanged, cache the answers of the
    /// reply and return the reply re-encoded.
    async fn forward(
        &self,
        datagram: &[u8],
        request: &Message,
        missing: &[&Question],
    ) -> Result<Vec<u8>> {
        let upstream_start = Instant::now();
        let raw = self.upstream.exchange(datagram).await?;
        let reply = Message::decode(&raw)?;
        if reply.header.id != request.header.id {
            return Err(Error::UnexpectedReply {
                expected: request.header.id,
                got: reply.header.id,
            });
        }

        self.remember(missing, &reply.answers);
        debug!(
            id = reply.header.id,
            answers = reply.answers.len(),
            upstream_ms = as_ms(upstream_start.elapsed()),
            "upstream replied"
        );

        reply.encode()
    }

    /// Store the answers of an upstream reply.
    ///
    /// With a single unresolved question every answer is stored under it,
    /// so the store keeps the last one. With several, each answer goes to
    /// the unresolved question whose name and class it matches.
    fn remember(&self, missing: &[&Question], answers: &[Record]) {
        if let [question] = missing {
            for answer in answers {
                self.store.store((*question).clone(), answer.clone());
            }
            return;
        }

        for answer in answers {
            let owner = missing
                .iter()
                .find(|q| q.qclass == answer.class && q.name.eq_ignore_case(&answer.name));
            if let Some(question) = owner {
                self.store.store((*question).clone(), answer.clone());
            }
        }
    }

    fn failure_response(&self, request: &Message) -> Option<Vec<u8>> {
        if !self.servfail_on_upstream_error {
            return None;
        }
        Message::error_response(request, rcode::SERVER_FAILURE)
            .encode()
            .ok()
    }
}

fn as_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{CLASS_IN, Header, Name, rtype};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    type Respond = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

    /// Mock upstream for testing.
    ///
    /// Records every forwarded datagram and answers with a configurable
    /// closure.
    pub struct MockUpstream {
        pub forwarded: Mutex<Vec<Vec<u8>>>,
        pub exchange_count: AtomicU64,
        respond: Respond,
    }

    impl MockUpstream {
        pub fn new(respond: impl Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static) -> Self {
            Self {
                forwarded: Mutex::new(Vec::new()),
                exchange_count: AtomicU64::new(0),
                respond: Box::new(respond),
            }
        }

        /// Answers every question with an A record carrying `addr`.
        pub fn answering(ttl: u32, addr: [u8; 4]) -> Self {
            Self::new(move |query| Ok(reply_with_a(query, ttl, addr)))
        }

        pub fn failing() -> Self {
            Self::new(|_| Err(Error::UpstreamTimeout(Duration::from_millis(10))))
        }

        pub fn exchange_count(&self) -> u64 {
            self.exchange_count.load(Ordering::SeqCst)
        }
    }

    impl Upstream for MockUpstream {
        async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>> {
            self.exchange_count.fetch_add(1, Ordering::SeqCst);
            self.forwarded.lock().unwrap().push(query.to_vec());
            (self.respond)(query)
        }
    }

    fn reply_with_a(query: &[u8], ttl: u32, addr: [u8; 4]) -> Vec<u8> {
        let request = Message::decode(query).unwrap();
        let answers = request
            .questions
            .iter()
            .map(|q| Record::new(q.name.clone(), rtype::A, CLASS_IN, ttl, addr.to_vec()))
            .collect();
        Message::build_response(&request, answers).encode().unwrap()
    }

    fn query(id: u16, names: &[&str]) -> Vec<u8> {
        Message {
            header: Header {
                id,
                flags: 0x0100,
                ..Header::default()
            },
            questions: names.iter().map(|n| question(n)).collect(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
        .encode()
        .unwrap()
    }

    fn question(name: &str) -> Question {
        Question::new(name.parse::<Name>().unwrap(), rtype::A, CLASS_IN)
    }

    fn resolver(upstream: MockUpstream) -> Resolver<MockUpstream> {
        Resolver::new(Arc::new(RecordStore::new()), upstream)
    }

    #[tokio::test]
    async fn cache_hit_answers_without_upstream() {
        let resolver = resolver(MockUpstream::failing());
        let cached = Record::new(
            "example.com".parse().unwrap(),
            rtype::A,
            CLASS_IN,
            300,
            vec![93, 184, 216, 34],
        );
        resolver.store().store(question("example.com"), cached.clone());

        let outcome = resolver.resolve(&query(0xBEEF, &["example.com"])).await;

        let Outcome::Cached(bytes) = &outcome else {
            panic!("expected a cached answer, got {outcome:?}");
        };
        let response = Message::decode(bytes).unwrap();
        assert_eq!(response.header.id, 0xBEEF);
        assert!(response.header.is_response());
        assert_eq!(response.header.answer_count, 1);
        assert_eq!(response.answers, [cached]);
        assert_eq!(resolver.upstream().exchange_count(), 0);
    }

    #[tokio::test]
    async fn cache_miss_forwards_original_bytes_once() {
        let resolver = resolver(MockUpstream::answering(300, [93, 184, 216, 34]));
        let request = query(0x1234, &["example.com"]);

        let outcome = resolver.resolve(&request).await;

        let Outcome::Forwarded(bytes) = &outcome else {
            panic!("expected a forwarded answer, got {outcome:?}");
        };
        assert_eq!(resolver.upstream().exchange_count(), 1);
        assert_eq!(resolver.upstream().forwarded.lock().unwrap()[0], request);

        let upstream_reply = reply_with_a(&request, 300, [93, 184, 216, 34]);
        let relayed = Message::decode(&upstream_reply).unwrap().encode().unwrap();
        assert_eq!(*bytes, relayed);

        let stored = resolver
            .store()
            .lookup(&question("example.com"), Instant::now())
            .unwrap();
        assert_eq!(stored.rdata, [93, 184, 216, 34]);
        assert_eq!(stored.ttl, 300);
    }

    #[tokio::test]
    async fn forwarded_answer_stays_cached_for_its_ttl() {
        let resolver = resolver(MockUpstream::answering(300, [93, 184, 216, 34]));

        resolver.resolve(&query(0x1234, &["example.com"])).await;
        let second = resolver.resolve(&query(0x4321, &["example.com"])).await;

        let Outcome::Cached(bytes) = &second else {
            panic!("expected a cached answer, got {second:?}");
        };
        assert_eq!(Message::decode(bytes).unwrap().header.id, 0x4321);
        assert_eq!(resolver.upstream().exchange_count(), 1);

        let stored = resolver
            .store()
            .lookup(&question("example.com"), Instant::now())
            .unwrap();
        let store = resolver.store();
        let at = |secs| stored.created_at + Duration::from_secs(secs);
        assert!(store.lookup(&question("example.com"), at(299)).is_some());
        assert!(store.lookup(&question("example.com"), at(301)).is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_forwarded_again() {
        let resolver = resolver(MockUpstream::answering(60, [10, 0, 0, 1]));
        let mut stale = Record::new(
            "example.com".parse().unwrap(),
            rtype::A,
            CLASS_IN,
            1,
            vec![10, 0, 0, 9],
        );
        stale.created_at = Instant::now() - Duration::from_secs(5);
        resolver.store().store(question("example.com"), stale);

        let outcome = resolver.resolve(&query(1, &["example.com"])).await;

        assert!(matches!(outcome, Outcome::Forwarded(_)));
        assert_eq!(resolver.upstream().exchange_count(), 1);
    }

    #[tokio::test]
    async fn malformed_request_is_dropped() {
        let resolver = resolver(MockUpstream::answering(60, [1, 1, 1, 1]));
        let mut request = query(1, &["example.com"]);
        request.truncate(15);

        let outcome = resolver.resolve(&request).await;

        assert!(matches!(outcome, Outcome::Dropped));
        assert!(outcome.response().is_none());
        assert_eq!(resolver.upstream().exchange_count(), 0);
        assert_eq!(resolver.stats_snapshot_and_reset().dropped, 1);
    }

    #[tokio::test]
    async fn responses_and_empty_queries_are_dropped() {
        let resolver = resolver(MockUpstream::answering(60, [1, 1, 1, 1]));
        let mut response = query(1, &["example.com"]);
        response[2] |= 0x80;

        assert!(matches!(resolver.resolve(&response).await, Outcome::Dropped));
        assert!(matches!(resolver.resolve(&query(2, &[])).await, Outcome::Dropped));
        assert_eq!(resolver.upstream().exchange_count(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_sends_nothing_by_default() {
        let resolver = resolver(MockUpstream::failing());

        let outcome = resolver.resolve(&query(7, &["example.com"])).await;

        assert!(matches!(outcome, Outcome::UpstreamFailed(None)));
        assert!(outcome.response().is_none());
        assert!(resolver.store().is_empty());
        let stats = resolver.stats_snapshot_and_reset();
        assert_eq!(stats.upstream_failures, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn upstream_failure_answers_servfail_when_enabled() {
        let resolver = resolver(MockUpstream::failing()).with_servfail_on_upstream_error(true);

        let outcome = resolver.resolve(&query(7, &["example.com"])).await;

        let response = Message::decode(outcome.response().unwrap()).unwrap();
        assert_eq!(response.header.id, 7);
        assert_eq!(response.header.rcode(), rcode::SERVER_FAILURE);
        assert_eq!(response.questions, [question("example.com")]);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn malformed_upstream_reply_is_a_failure() {
        let resolver = resolver(MockUpstream::new(|_| Ok(vec![0x00, 0x01, 0x81])));

        let outcome = resolver.resolve(&query(1, &["example.com"])).await;

        assert!(matches!(outcome, Outcome::UpstreamFailed(None)));
        assert!(resolver.store().is_empty());
    }

    #[tokio::test]
    async fn reply_with_wrong_id_is_a_failure() {
        let resolver = resolver(MockUpstream::new(|query| {
            let mut reply = reply_with_a(query, 60, [1, 1, 1, 1]);
            reply[1] ^= 0xFF;
            Ok(reply)
        }));

        let outcome = resolver.resolve(&query(0x0101, &["example.com"])).await;

        assert!(matches!(outcome, Outcome::UpstreamFailed(None)));
        assert!(resolver.store().is_empty());
    }

    #[tokio::test]
    async fn multiple_questions_are_answered_together_from_cache() {
        let resolver = resolver(MockUpstream::failing());
        for (name, addr) in [("a.example", 1), ("b.example", 2)] {
            let record = Record::new(name.parse().unwrap(), rtype::A, CLASS_IN, 60, vec![addr; 4]);
            resolver.store().store(question(name), record);
        }

        let outcome = resolver.resolve(&query(9, &["a.example", "b.example"])).await;

        let response = Message::decode(outcome.response().unwrap()).unwrap();
        assert_eq!(response.header.answer_count, 2);
        assert_eq!(response.answers[0].rdata, [1; 4]);
        assert_eq!(response.answers[1].rdata, [2; 4]);
    }

    #[tokio::test]
    async fn partial_miss_forwards_once_and_caches_by_owner() {
        let resolver = resolver(MockUpstream::answering(60, [7, 7, 7, 7]));
        let cached = Record::new("a.example".parse().unwrap(), rtype::A, CLASS_IN, 60, vec![1; 4]);
        resolver.store().store(question("a.example"), cached.clone());

        let outcome = resolver.resolve(&query(9, &["a.example", "b.example"])).await;

        assert!(matches!(outcome, Outcome::Forwarded(_)));
        assert_eq!(resolver.upstream().exchange_count(), 1);
        let now = Instant::now();
        // The cached question keeps its record; the missing one gets its own.
        assert_eq!(resolver.store().lookup(&question("a.example"), now), Some(cached));
        let fetched = resolver.store().lookup(&question("b.example"), now).unwrap();
        assert_eq!(fetched.name, "b.example".parse::<Name>().unwrap());
        assert_eq!(fetched.rdata, [7; 4]);
    }

    #[tokio::test]
    async fn single_question_caches_last_answer() {
        let resolver = resolver(MockUpstream::new(|query| {
            let request = Message::decode(query).unwrap();
            let name: Name = "example.com".parse().unwrap();
            let answers = vec![
                Record::new(name.clone(), rtype::A, CLASS_IN, 60, vec![1; 4]),
                Record::new(name, rtype::A, CLASS_IN, 60, vec![2; 4]),
            ];
            Message::build_response(&request, answers).encode()
        }));

        resolver.resolve(&query(1, &["example.com"])).await;

        let stored = resolver
            .store()
            .lookup(&question("example.com"), Instant::now())
            .unwrap();
        assert_eq!(stored.rdata, [2; 4]);
        assert_eq!(resolver.cache_len(), 1);
    }
}
