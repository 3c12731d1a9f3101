use std::collections::HashMap;

use tracing::debug;

use crate::config::{TransformConfig, TransformLimits};
use crate::eligibility::{Admission, Eligibility, HookPoint, ResponseMetadata};
use crate::error::TransformError;
use crate::parser::{IncrementalParser, JsonParser};
use crate::serializer::{CompactJson, Serializer};
use crate::session::{Progress, SessionId, TransformEvent, TransformSession};
use crate::sink::FlowControlledSink;
use crate::source::FlowControlledSource;

type ParserFactory<P> = Box<dyn Fn(&TransformLimits) -> P>;

/// Engine specialised to JSON documents.
pub type JsonEngine = TransformEngine<JsonParser, CompactJson>;

/// Collects the hook points before the engine is built; the list is fixed
/// afterwards.
pub struct EngineBuilder<P, S> {
    config: TransformConfig,
    hooks: Vec<HookPoint>,
    make_parser: ParserFactory<P>,
    serializer: S,
}

impl<P, S> EngineBuilder<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value> + Clone,
{
    pub fn with_parts(
        config: TransformConfig,
        make_parser: impl Fn(&TransformLimits) -> P + 'static,
        serializer: S,
    ) -> Self {
        Self {
            config,
            hooks: Vec::new(),
            make_parser: Box::new(make_parser),
            serializer,
        }
    }

    pub fn hook(mut self, point: HookPoint) -> Self {
        if !self.hooks.contains(&point) {
            self.hooks.push(point);
        }
        self
    }

    /// Without explicit hooks, [`HookPoint::DEFAULTS`] are registered.
    pub fn build(self) -> TransformEngine<P, S> {
        let hooks = if self.hooks.is_empty() {
            HookPoint::DEFAULTS.to_vec()
        } else {
            self.hooks
        };
        debug!(?hooks, "transform engine hooks registered");
        TransformEngine {
            eligibility: Eligibility::new(self.config.eligibility.clone()),
            config: self.config,
            hooks: hooks.into_boxed_slice(),
            make_parser: self.make_parser,
            serializer: self.serializer,
            sessions: HashMap::new(),
        }
    }
}

/// Host-side registry of transform sessions keyed by connection.
///
/// Admission creates a session; events are routed to it by id; `Closed`
/// releases and unregisters it. Sessions never share state.
pub struct TransformEngine<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value>,
{
    config: TransformConfig,
    eligibility: Eligibility,
    hooks: Box<[HookPoint]>,
    make_parser: ParserFactory<P>,
    serializer: S,
    sessions: HashMap<SessionId, TransformSession<P, S>>,
}

impl TransformEngine<JsonParser, CompactJson> {
    pub fn builder(config: TransformConfig) -> EngineBuilder<JsonParser, CompactJson> {
        EngineBuilder::with_parts(config, |limits| JsonParser::new(*limits), CompactJson)
    }

    pub fn json(config: TransformConfig) -> Self {
        Self::builder(config).build()
    }
}

impl<P, S> TransformEngine<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value> + Clone,
{
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn hooks(&self) -> &[HookPoint] {
        &self.hooks
    }

    pub fn on_should_admit(&self, response: &ResponseMetadata) -> bool {
        self.eligibility.should_transform(response)
    }

    /// Creates the session for `id`, or returns the existing one.
    pub fn on_session_start(&mut self, id: SessionId) -> &mut TransformSession<P, S> {
        let make_parser = &self.make_parser;
        let limits = &self.config.limits;
        let serializer = &self.serializer;
        self.sessions.entry(id).or_insert_with(|| {
            debug!(session = %id, "transform session started");
            TransformSession::new(id, make_parser(limits), serializer.clone())
        })
    }

    /// Runs admission for a hook point. Returns the caching directives when
    /// a session was created.
    pub fn on_hook(
        &mut self,
        point: HookPoint,
        id: SessionId,
        response: &ResponseMetadata,
    ) -> Option<Admission> {
        if !self.hooks.contains(&point) {
            return None;
        }
        if self.sessions.contains_key(&id) {
            debug!(session = %id, ?point, "already admitted; skipping");
            return None;
        }
        if !self.eligibility.admits_at(point, response) {
            return None;
        }
        self.on_session_start(id);
        Some(Admission::default())
    }

    pub fn dispatch(
        &mut self,
        id: SessionId,
        event: TransformEvent,
        source: &mut dyn FlowControlledSource,
        sink: &mut dyn FlowControlledSink,
    ) -> Result<Progress, TransformError> {
        if event == TransformEvent::Closed {
            if let Some(mut session) = self.sessions.remove(&id) {
                session.release();
                debug!(session = %id, "transform session unregistered");
            }
            return Ok(Progress::Released);
        }
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(TransformError::UnknownSession(id))?;
        session.handle(event, source, sink)
    }

    pub fn session(&self, id: SessionId) -> Option<&TransformSession<P, S>> {
        self.sessions.get(&id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
