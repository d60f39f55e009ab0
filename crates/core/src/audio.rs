// Audio cues
//
// Playing a sound when a delay is raised is a best-effort side effect: the
// dispatcher spawns the playback and never hands a result back to the caller.
// Failures are logged at debug level and otherwise ignored.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which sound to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    /// A delay was detected automatically
    DriverDelay,

    /// An operator flagged a delay
    ManualDelay,
}

/// Something that can play an audio cue.
///
/// # Example
///
/// ```ignore
/// struct Beeper;
///
/// #[async_trait]
/// impl CuePlayer for Beeper {
///     async fn play(&self, cue: AudioCue) -> anyhow::Result<()> {
///         speaker::beep(cue).await
///     }
/// }
/// ```
#[async_trait]
pub trait CuePlayer: Send + Sync {
    async fn play(&self, cue: AudioCue) -> anyhow::Result<()>;

    /// Human-readable name for logging/debugging.
    fn name(&self) -> &'static str {
        "CuePlayer"
    }
}

/// Player that does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopCuePlayer;

#[async_trait]
impl CuePlayer for NoopCuePlayer {
    async fn play(&self, _cue: AudioCue) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NoopCuePlayer"
    }
}

/// Player that logs the cue instead of playing it (headless deployments).
#[derive(Debug, Clone, Default)]
pub struct LogCuePlayer;

#[async_trait]
impl CuePlayer for LogCuePlayer {
    async fn play(&self, cue: AudioCue) -> anyhow::Result<()> {
        info!(?cue, "Audio cue");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LogCuePlayer"
    }
}

/// Fire-and-forget front end for a [`CuePlayer`].
#[derive(Clone)]
pub struct CueDispatcher {
    player: Arc<dyn CuePlayer>,
    enabled: bool,
}

impl CueDispatcher {
    pub fn new(player: Arc<dyn CuePlayer>, enabled: bool) -> Self {
        Self { player, enabled }
    }

    /// Dispatcher that never plays anything
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCuePlayer), false)
    }

    /// Play a cue in the background.
    ///
    /// Outside a tokio runtime there is nowhere to run the playback, so the cue
    /// is skipped.
    pub fn dispatch(&self, cue: AudioCue) {
        if !self.enabled {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(?cue, "No async runtime, audio cue skipped");
            return;
        };

        let player = self.player.clone();
        handle.spawn(async move {
            if let Err(e) = player.play(cue).await {
                debug!(player = player.name(), ?cue, error = %e, "Audio cue failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingPlayer {
        played: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl CuePlayer for CountingPlayer {
        async fn play(&self, _cue: AudioCue) -> anyhow::Result<()> {
            self.played.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("speaker unplugged");
            }
            Ok(())
        }
    }

    async fn settle(played: &AtomicU32, expected: u32) {
        for _ in 0..50 {
            if played.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_dispatch_plays_in_background() {
        let played = Arc::new(AtomicU32::new(0));
        let dispatcher = CueDispatcher::new(
            Arc::new(CountingPlayer {
                played: played.clone(),
                fail: false,
            }),
            true,
        );

        dispatcher.dispatch(AudioCue::DriverDelay);
        settle(&played, 1).await;
        assert_eq!(played.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_player_is_swallowed() {
        let played = Arc::new(AtomicU32::new(0));
        let dispatcher = CueDispatcher::new(
            Arc::new(CountingPlayer {
                played: played.clone(),
                fail: true,
            }),
            true,
        );

        dispatcher.dispatch(AudioCue::ManualDelay);
        settle(&played, 1).await;
        assert_eq!(played.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_never_plays() {
        let played = Arc::new(AtomicU32::new(0));
        let dispatcher = CueDispatcher::new(
            Arc::new(CountingPlayer {
                played: played.clone(),
                fail: false,
            }),
            false,
        );

        dispatcher.dispatch(AudioCue::DriverDelay);
        tokio::task::yield_now().await;
        assert_eq!(played.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_without_runtime_is_noop() {
        CueDispatcher::new(Arc::new(LogCuePlayer), true).dispatch(AudioCue::DriverDelay);
    }
}
