//! Lifecycle of the playback context owned by a microphone test.
//!
//! A context is created lazily, reused across start/stop/play cycles, and
//! recreated only after it has been closed.

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::bridge::{AudioOutput, PlaybackContext};

pub enum ContextState {
    Uninitialized,
    Open(Box<dyn PlaybackContext>),
    Closed,
}

impl ContextState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Open(context) if context.is_suspended() => "suspended",
            ContextState::Open(_) => "active",
            ContextState::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ContextState::Open(_))
    }
}

pub struct PlaybackSlot {
    output: Box<dyn AudioOutput>,
    state: ContextState,
}

impl PlaybackSlot {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            state: ContextState::Uninitialized,
        }
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    /// Return the open context, creating it if there is none and asking it to
    /// resume if it is suspended.
    ///
    /// Hosts with an autoplay policy only let output start when this runs
    /// synchronously inside the user's click or key handler. Call it before the
    /// first `.await` of that handler; if it runs after a suspension point the
    /// host may keep the context muted.
    pub fn ensure(&mut self) -> Result<&mut dyn PlaybackContext> {
        if !self.state.is_open() {
            let context = self
                .output
                .create_context()
                .context("Failed to create playback context")?;
            info!(
                "Playback context created ({} Hz, {})",
                context.sample_rate(),
                if context.is_suspended() { "suspended" } else { "active" }
            );
            self.state = ContextState::Open(context);
        }

        let ContextState::Open(context) = &mut self.state else {
            bail!("Playback context is not open");
        };

        if context.is_suspended() {
            // TODO: surface resume failures once product decides whether they are actionable.
            if let Err(e) = context.resume() {
                debug!("Playback context resume failed, ignoring: {:#}", e);
            }
        }

        Ok(context.as_mut())
    }

    /// Close the context if one is open. Closing twice, or before anything was
    /// created, does nothing.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, ContextState::Closed) {
            ContextState::Open(mut context) => {
                if let Err(e) = context.close() {
                    debug!("Playback context close failed, ignoring: {:#}", e);
                }
                info!("Playback context closed");
            }
            other => self.state = other,
        }
    }
}
