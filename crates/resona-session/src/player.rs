//! Per-guild playback state.
//!
//! This is the control-plane view of a player: which track is loaded,
//! whether it is paused, the volume and where playback is. Decoding and
//! mixing happen elsewhere; the audio backend reports back through
//! [`Player::finish`], [`Player::fail`] and [`Player::report_stuck`].
//!
//! Every state change is sent to the client as an `event` frame
//! (`TrackStartEvent`, `TrackEndEvent`, `PlayerPauseEvent`, ...). While a
//! track is loaded the player also emits a `playerUpdate` snapshot on its
//! session's player-update scheduler.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use resona_protocol::{
    GuildId, Outbound, PlayerEvent, PlayerState, TrackEndReason, TrackException,
};
use resona_schedule::TaskHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{SessionContext, SessionError};

/// Highest accepted volume, in percent.
pub const MAX_VOLUME: u16 = 1000;

#[derive(Debug)]
struct Playback {
    track: Option<String>,
    paused: bool,
    volume: u16,
    /// Position at the last seek/pause/start, in milliseconds.
    position_ms: u64,
    /// When playback last (re)started; `None` while paused or stopped.
    running_since: Option<Instant>,
    updates: Option<TaskHandle>,
}

impl Playback {
    fn position(&self) -> u64 {
        let running = self
            .running_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.position_ms + running
    }

    fn freeze(&mut self) {
        self.position_ms = self.position();
        self.running_since = None;
    }
}

/// One guild's player. Created and destroyed only by its
/// [`SessionContext`].
pub struct Player {
    guild_id: GuildId,
    context: Weak<SessionContext>,
    playback: Mutex<Playback>,
}

impl Player {
    pub(crate) fn new(guild_id: GuildId, context: Weak<SessionContext>) -> Self {
        Self {
            guild_id,
            context,
            playback: Mutex::new(Playback {
                track: None,
                paused: false,
                volume: 100,
                position_ms: 0,
                running_since: None,
                updates: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// The owning session, if it still exists.
    pub fn context(&self) -> Option<Arc<SessionContext>> {
        self.context.upgrade()
    }

    /// Loads `track` and plays it from the beginning.
    ///
    /// A track that was already loaded ends with `REPLACED`. The paused
    /// flag is left alone, so a paused player holds the new track at 0.
    ///
    /// # Errors
    /// [`SessionError::ContextGone`] if the session no longer exists, or a
    /// scheduling error if it is shutting down.
    pub fn play(self: &Arc<Self>, track: impl Into<String>) -> Result<(), SessionError> {
        let context = self.context().ok_or(SessionError::ContextGone(self.guild_id))?;
        let track = track.into();

        let replaced = {
            let mut playback = self.lock();
            if playback.updates.is_none() {
                playback.updates = Some(self.schedule_updates(&context)?);
            }
            let replaced = playback.track.replace(track.clone());
            playback.position_ms = 0;
            playback.running_since = (!playback.paused).then(Instant::now);
            replaced
        };

        if let Some(previous) = replaced {
            self.emit(&context, self.track_end(previous, TrackEndReason::Replaced));
        }
        debug!(guild_id = %self.guild_id, %track, "track started");
        self.emit(
            &context,
            PlayerEvent::TrackStartEvent {
                guild_id: self.guild_id,
                track,
            },
        );
        Ok(())
    }

    fn schedule_updates(
        self: &Arc<Self>,
        context: &Arc<SessionContext>,
    ) -> Result<TaskHandle, SessionError> {
        let period = Duration::from_secs(context.config().player_update_interval_secs);
        let player = Arc::downgrade(self);
        let ctx = Arc::downgrade(context);
        let handle = context
            .player_updates()
            .schedule_at_fixed_rate(period, period, move || {
                let (Some(context), Some(player)) = (ctx.upgrade(), player.upgrade()) else {
                    return;
                };
                context.registry().send_player_update(&context, &player);
            })?;
        Ok(handle)
    }

    /// Unloads the current track and stops periodic updates. The track
    /// ends with `STOPPED`.
    pub fn stop(&self) {
        self.end_track(TrackEndReason::Stopped);
    }

    /// The current track played to its end.
    pub fn finish(&self) {
        self.end_track(TrackEndReason::Finished);
    }

    /// The current track broke. Sends the exception, then ends the track
    /// with `LOAD_FAILED`.
    pub fn fail(&self, exception: TrackException) {
        let Some(track) = self.track() else {
            return;
        };
        warn!(guild_id = %self.guild_id, error = %exception.message, "track failed");
        if let Some(context) = self.context() {
            self.emit(
                &context,
                PlayerEvent::TrackExceptionEvent {
                    guild_id: self.guild_id,
                    track,
                    exception,
                },
            );
        }
        self.end_track(TrackEndReason::LoadFailed);
    }

    /// The current track produced no audio for `threshold_ms`. Sends the
    /// stuck event followed by a fresh snapshot.
    pub fn report_stuck(&self, threshold_ms: u64) {
        let (Some(track), Some(context)) = (self.track(), self.context()) else {
            return;
        };
        warn!(guild_id = %self.guild_id, %track, threshold_ms, "track got stuck");
        self.emit(
            &context,
            PlayerEvent::TrackStuckEvent {
                guild_id: self.guild_id,
                track,
                threshold_ms,
            },
        );
        context.registry().send_player_update(&context, self);
    }

    fn end_track(&self, reason: TrackEndReason) {
        let ended = {
            let mut playback = self.lock();
            if let Some(updates) = playback.updates.take() {
                updates.cancel();
            }
            playback.position_ms = 0;
            playback.running_since = None;
            playback.track.take()
        };

        if let (Some(track), Some(context)) = (ended, self.context()) {
            debug!(guild_id = %self.guild_id, %track, ?reason, "track ended");
            self.emit(&context, self.track_end(track, reason));
        }
    }

    pub fn set_paused(&self, paused: bool) {
        {
            let mut playback = self.lock();
            if playback.paused == paused {
                return;
            }
            playback.paused = paused;
            if paused {
                playback.freeze();
            } else if playback.track.is_some() {
                playback.running_since = Some(Instant::now());
            }
        }

        let guild_id = self.guild_id;
        let event = if paused {
            PlayerEvent::PlayerPauseEvent { guild_id }
        } else {
            PlayerEvent::PlayerResumeEvent { guild_id }
        };
        if let Some(context) = self.context() {
            self.emit(&context, event);
        }
    }

    fn track_end(&self, track: String, reason: TrackEndReason) -> PlayerEvent {
        PlayerEvent::TrackEndEvent {
            guild_id: self.guild_id,
            track,
            reason,
        }
    }

    /// Sends through the session so events queue while it is paused.
    fn emit(&self, context: &SessionContext, event: PlayerEvent) {
        context.send(&Outbound::Event(event.into()));
    }

    /// Jumps to `position_ms` in the current track.
    ///
    /// # Errors
    /// [`SessionError::NothingPlaying`] if no track is loaded.
    pub fn seek(&self, position_ms: u64) -> Result<(), SessionError> {
        let mut playback = self.lock();
        if playback.track.is_none() {
            return Err(SessionError::NothingPlaying(self.guild_id));
        }
        playback.position_ms = position_ms;
        if playback.running_since.is_some() {
            playback.running_since = Some(Instant::now());
        }
        Ok(())
    }

    /// Sets the volume, clamped to [`MAX_VOLUME`].
    pub fn set_volume(&self, volume: u16) {
        self.lock().volume = volume.min(MAX_VOLUME);
    }

    pub fn volume(&self) -> u16 {
        self.lock().volume
    }

    pub fn track(&self) -> Option<String> {
        self.lock().track.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// `true` while a track is loaded and not paused.
    pub fn is_playing(&self) -> bool {
        let playback = self.lock();
        playback.track.is_some() && !playback.paused
    }

    /// Playback position in milliseconds.
    pub fn position(&self) -> u64 {
        self.lock().position()
    }

    /// A snapshot for `playerUpdate` frames.
    pub fn state(&self) -> PlayerState {
        let (connected, ping) = self
            .context()
            .and_then(|context| context.voice_client().get_connection(self.guild_id))
            .map(|conn| (conn.is_connected(), conn.gateway_ping().unwrap_or(-1)))
            .unwrap_or((false, -1));

        let playback = self.lock();
        PlayerState {
            time: unix_millis(),
            position: playback.track.as_ref().map(|_| playback.position()),
            connected,
            ping,
            playing: playback.track.is_some() && !playback.paused,
            paused: playback.paused,
            volume: playback.volume,
        }
    }

    /// Releases the player's resources. Called by the session when the
    /// player is removed.
    pub(crate) fn destroy(&self) {
        self.end_track(TrackEndReason::Cleanup);
        debug!(guild_id = %self.guild_id, "player destroyed");
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("playback", &*self.lock())
            .finish()
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
