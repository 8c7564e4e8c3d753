use bytes::Bytes;

/// Output generated for one backend response, held until the guardrail
/// chain has seen the complete text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub response_id: String,
    pub text: String,
    pub audio: Vec<Bytes>,
    /// Set once the backend sent the authoritative transcript
    transcript_final: bool,
}

impl Turn {
    fn new(response_id: &str) -> Self {
        Self {
            response_id: response_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.audio.is_empty()
    }

    pub fn audio_bytes(&self) -> usize {
        self.audio.iter().map(Bytes::len).sum()
    }
}

/// Accumulates deltas for the turn currently being generated.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    current: Option<Turn>,
}

impl TurnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_audio(&mut self, response_id: &str, audio: Bytes) {
        self.turn_for(response_id).audio.push(audio);
    }

    pub fn push_transcript_delta(&mut self, response_id: &str, delta: &str) {
        let turn = self.turn_for(response_id);
        if !turn.transcript_final {
            turn.text.push_str(delta);
        }
    }

    /// Replaces the accumulated deltas with the complete transcript.
    pub fn set_transcript(&mut self, response_id: &str, transcript: String) {
        let turn = self.turn_for(response_id);
        turn.text = transcript;
        turn.transcript_final = true;
    }

    /// Removes and returns the turn for `response_id`, if it is the one
    /// being buffered.
    pub fn take(&mut self, response_id: &str) -> Option<Turn> {
        match &self.current {
            Some(turn) if turn.response_id == response_id => self.current.take(),
            _ => None,
        }
    }

    /// Drops whatever is buffered. Returns the discarded turn.
    pub fn discard(&mut self) -> Option<Turn> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Turn> {
        self.current.as_ref()
    }

    fn turn_for(&mut self, response_id: &str) -> &mut Turn {
        let stale = self
            .current
            .as_ref()
            .is_some_and(|turn| turn.response_id != response_id);
        if stale {
            if let Some(old) = self.current.take() {
                tracing::warn!(
                    response_id = %old.response_id,
                    "Discarding unfinished turn superseded by a new response"
                );
            }
        }
        self.current.get_or_insert_with(|| Turn::new(response_id))
    }
}
