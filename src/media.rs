// src/media.rs - gesture to media-player command mapping
use std::collections::HashMap;
use std::sync::{mpsc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use enigo::{Direction as EnigoDirection, Enigo, InputResult, Key, Keyboard, Settings};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::dispatch::CommandExecutor;
use crate::error::{Error, Result};
use crate::events::{GestureKind, PlayPauseLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPlayer {
    Spotify,
    Vlc,
    YouTube,
    WindowsMedia,
}

impl MediaPlayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Vlc => "vlc",
            Self::YouTube => "youtube",
            Self::WindowsMedia => "windows_media",
        }
    }

    /// Window title fragment for desktop players that need focus first.
    /// Browser playback is driven through whatever tab has focus.
    pub fn window_title(&self) -> Option<&'static str> {
        match self {
            Self::Spotify => Some("spotify"),
            Self::Vlc => Some("vlc"),
            Self::WindowsMedia => Some("windows media player"),
            Self::YouTube => None,
        }
    }

    fn play_pause_keys(&self) -> KeyChord {
        match self {
            Self::YouTube => KeyChord::single(MediaKey::Char('k')),
            Self::Spotify | Self::Vlc => KeyChord::single(MediaKey::Space),
            Self::WindowsMedia => KeyChord::combo(&[MediaKey::Ctrl, MediaKey::Char('p')]),
        }
    }

    fn previous_keys(&self) -> KeyChord {
        match self {
            Self::YouTube => KeyChord::combo(&[MediaKey::Shift, MediaKey::Char('p')]),
            Self::Spotify => KeyChord::combo(&[MediaKey::Ctrl, MediaKey::Left]),
            Self::Vlc => KeyChord::single(MediaKey::Char('p')),
            Self::WindowsMedia => KeyChord::combo(&[MediaKey::Ctrl, MediaKey::Char('b')]),
        }
    }

    fn next_keys(&self) -> KeyChord {
        match self {
            Self::YouTube => KeyChord::combo(&[MediaKey::Shift, MediaKey::Char('n')]),
            Self::Spotify => KeyChord::combo(&[MediaKey::Ctrl, MediaKey::Right]),
            Self::Vlc => KeyChord::single(MediaKey::Char('n')),
            Self::WindowsMedia => KeyChord::combo(&[MediaKey::Ctrl, MediaKey::Char('f')]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    Ctrl,
    Shift,
    Space,
    Left,
    Right,
    VolumeUp,
    VolumeDown,
    Char(char),
}

impl MediaKey {
    fn to_enigo(self) -> Key {
        match self {
            Self::Ctrl => Key::Control,
            Self::Shift => Key::Shift,
            Self::Space => Key::Space,
            Self::Left => Key::LeftArrow,
            Self::Right => Key::RightArrow,
            Self::VolumeUp => Key::VolumeUp,
            Self::VolumeDown => Key::VolumeDown,
            Self::Char(c) => Key::Unicode(c),
        }
    }
}

impl std::fmt::Display for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ctrl => f.write_str("ctrl"),
            Self::Shift => f.write_str("shift"),
            Self::Space => f.write_str("space"),
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::VolumeUp => f.write_str("volumeup"),
            Self::VolumeDown => f.write_str("volumedown"),
            Self::Char(c) => write!(f, "{}", c),
        }
    }
}

/// Keys pressed together: every key but the last is held as a modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord(pub Vec<MediaKey>);

impl KeyChord {
    pub fn single(key: MediaKey) -> Self {
        Self(vec![key])
    }

    pub fn combo(keys: &[MediaKey]) -> Self {
        Self(keys.to_vec())
    }
}

impl std::fmt::Display for KeyChord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// OS keyboard and window access.
pub trait KeyInjector: Send + Sync {
    fn send(&self, chord: &KeyChord) -> Result<()>;

    /// Brings a window whose title contains `title` to the front.
    fn focus_window(&self, title: &str) -> Result<bool>;
}

/// Logs the keys it would press. Used for dry runs.
#[derive(Debug, Default)]
pub struct LoggingInjector;

impl KeyInjector for LoggingInjector {
    fn send(&self, chord: &KeyChord) -> Result<()> {
        info!(keys = %chord, "Key press (dry run)");
        Ok(())
    }

    fn focus_window(&self, title: &str) -> Result<bool> {
        info!(title, "Focus window (dry run)");
        Ok(true)
    }
}

/// Presses a chord on `keyboard`, releasing held modifiers even when a
/// later key fails.
fn press_chord(keyboard: &mut impl Keyboard, chord: &KeyChord) -> InputResult<()> {
    let Some((last, modifiers)) = chord.0.split_last() else {
        return Ok(());
    };

    let mut held = Vec::with_capacity(modifiers.len());
    let mut result = Ok(());
    for key in modifiers {
        result = keyboard.key(key.to_enigo(), EnigoDirection::Press);
        if result.is_err() {
            break;
        }
        held.push(*key);
    }
    if result.is_ok() {
        result = keyboard.key(last.to_enigo(), EnigoDirection::Click);
    }
    for key in held.iter().rev() {
        let released = keyboard.key(key.to_enigo(), EnigoDirection::Release);
        if result.is_ok() {
            result = released;
        }
    }
    result
}

type KeyRequest = (KeyChord, mpsc::Sender<Result<()>>);

/// Real key injection through `enigo`.
///
/// The `Enigo` handle lives on its own thread and chords are sent to it, so
/// the injector can be shared with the dispatch tasks. Window focus is not
/// something `enigo` offers; `focus_window` reports no window.
pub struct EnigoInjector {
    requests: Mutex<mpsc::Sender<KeyRequest>>,
}

impl EnigoInjector {
    pub fn new() -> Result<Self> {
        let (requests, incoming) = mpsc::channel::<KeyRequest>();
        let (ready_tx, ready_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("oktrix-keys".into())
            .spawn(move || {
                let mut enigo = match Enigo::new(&Settings::default()) {
                    Ok(enigo) => {
                        let _ = ready_tx.send(Ok(()));
                        enigo
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(Error::Executor(format!(
                            "keyboard init failed: {:?}",
                            e
                        ))));
                        return;
                    }
                };
                for (chord, reply) in incoming {
                    let result = press_chord(&mut enigo, &chord)
                        .map_err(|e| Error::Executor(format!("pressing {}: {:?}", chord, e)));
                    let _ = reply.send(result);
                }
                debug!("Key injection thread finished");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Executor("key injection thread exited".into()))??;
        info!("Keyboard injection ready");
        Ok(Self {
            requests: Mutex::new(requests),
        })
    }
}

impl KeyInjector for EnigoInjector {
    fn send(&self, chord: &KeyChord) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send((chord.clone(), reply_tx))
            .map_err(|_| Error::Executor("key injection thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Executor("key injection thread is gone".into()))?
    }

    fn focus_window(&self, title: &str) -> Result<bool> {
        debug!(title, "Window focus unsupported, sending keys to the focused window");
        Ok(false)
    }
}

/// Names of running processes, lowercase.
pub trait ProcessProbe: Send + Sync {
    fn process_names(&self) -> Result<Vec<String>>;
}

/// Reads `/proc/<pid>/comm` on Linux.
#[derive(Debug, Default)]
pub struct ProcProbe;

impl ProcessProbe for ProcProbe {
    fn process_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir("/proc")? {
            let Ok(entry) = entry else { continue };
            let is_pid = entry
                .file_name()
                .to_str()
                .map(|name| name.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false);
            if !is_pid {
                continue;
            }
            // Processes can exit between listing and reading.
            if let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) {
                names.push(comm.trim().to_lowercase());
            }
        }
        Ok(names)
    }
}

/// Fixed process list.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe(pub Vec<String>);

impl ProcessProbe for StaticProbe {
    fn process_names(&self) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|name| name.to_lowercase()).collect())
    }
}

const BROWSERS: [&str; 5] = ["chrome", "firefox", "msedge", "opera", "brave"];

fn strip_exe(name: &str) -> &str {
    name.strip_suffix(".exe").unwrap_or(name)
}

/// Picks the player to control from the running processes. Dedicated
/// players win over browsers.
pub fn detect_player(process_names: &[String]) -> Option<MediaPlayer> {
    let running = |wanted: &str| process_names.iter().any(|name| strip_exe(name) == wanted);

    if running("spotify") {
        Some(MediaPlayer::Spotify)
    } else if running("vlc") {
        Some(MediaPlayer::Vlc)
    } else if running("wmplayer") {
        Some(MediaPlayer::WindowsMedia)
    } else if BROWSERS.iter().any(|browser| running(browser)) {
        Some(MediaPlayer::YouTube)
    } else {
        None
    }
}

struct ControllerState {
    active_player: Option<MediaPlayer>,
    last_detection: Option<Instant>,
    player_states: HashMap<MediaPlayer, PlaybackState>,
}

/// Command executor for common media players.
///
/// Tracks play/pause per player, since players do not report it back.
pub struct MediaController {
    injector: Box<dyn KeyInjector>,
    probe: Box<dyn ProcessProbe>,
    detection_cooldown: Duration,
    focus_delay: Duration,
    state: Mutex<ControllerState>,
}

impl MediaController {
    pub fn new(
        config: &MediaConfig,
        injector: Box<dyn KeyInjector>,
        probe: Box<dyn ProcessProbe>,
    ) -> Self {
        let player_states = [
            MediaPlayer::Spotify,
            MediaPlayer::Vlc,
            MediaPlayer::YouTube,
            MediaPlayer::WindowsMedia,
        ]
        .into_iter()
        .map(|player| (player, PlaybackState::Paused))
        .collect();

        Self {
            injector,
            probe,
            detection_cooldown: Duration::try_from_secs_f64(config.detection_cooldown_secs)
                .unwrap_or_else(|_| {
                    Duration::from_secs_f64(MediaConfig::default().detection_cooldown_secs)
                }),
            focus_delay: Duration::from_millis(config.window_focus_delay_ms),
            state: Mutex::new(ControllerState {
                active_player: None,
                last_detection: None,
                player_states,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Media controller state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Active player, re-probed at most once per detection cooldown.
    pub fn detect_active_player(&self) -> Option<MediaPlayer> {
        let mut state = self.lock_state();
        let fresh = state
            .last_detection
            .map_or(false, |at| at.elapsed() < self.detection_cooldown);
        if fresh {
            return state.active_player;
        }

        state.last_detection = Some(Instant::now());
        state.active_player = match self.probe.process_names() {
            Ok(names) => detect_player(&names),
            Err(e) => {
                warn!(error = %e, "Process probe failed");
                None
            }
        };
        debug!(player = ?state.active_player, "Media player detection");
        state.active_player
    }

    pub fn playback_state(&self, player: MediaPlayer) -> PlaybackState {
        self.lock_state()
            .player_states
            .get(&player)
            .copied()
            .unwrap_or(PlaybackState::Paused)
    }

    fn focus(&self, player: MediaPlayer) {
        let Some(title) = player.window_title() else {
            return;
        };
        match self.injector.focus_window(title) {
            Ok(true) => std::thread::sleep(self.focus_delay),
            Ok(false) => debug!(title, "No window to focus"),
            Err(e) => warn!(title, error = %e, "Error activating window"),
        }
    }

    fn press(&self, chord: &KeyChord) -> Result<()> {
        self.injector
            .send(chord)
            .map_err(|e| Error::Executor(format!("sending {}: {}", chord, e)))
    }

    fn play_pause(&self, player: MediaPlayer) -> Result<bool> {
        self.focus(player);
        self.press(&player.play_pause_keys())?;

        let mut state = self.lock_state();
        let current = state
            .player_states
            .get(&player)
            .copied()
            .unwrap_or(PlaybackState::Paused);
        let (action, next) = match current {
            PlaybackState::Playing => ("PAUSE", PlaybackState::Paused),
            PlaybackState::Paused => ("PLAY", PlaybackState::Playing),
        };
        state.player_states.insert(player, next);
        info!("{} -> {}", action, player.as_str().to_uppercase());
        Ok(true)
    }

    fn skip(&self, player: MediaPlayer, forward: bool) -> Result<bool> {
        self.focus(player);
        let chord = if forward {
            player.next_keys()
        } else {
            player.previous_keys()
        };
        self.press(&chord)?;
        info!(
            "{} -> {}",
            if forward { "NEXT" } else { "PREVIOUS" },
            player.as_str().to_uppercase()
        );
        Ok(true)
    }

    fn volume(&self, up: bool) -> Result<bool> {
        let chord = KeyChord::single(if up { MediaKey::VolumeUp } else { MediaKey::VolumeDown });
        self.press(&chord)?;
        info!("{}", if up { "VOLUME UP" } else { "VOLUME DOWN" });
        Ok(true)
    }
}

impl CommandExecutor for MediaController {
    fn execute(&self, gesture: GestureKind) -> Result<bool> {
        if !gesture.is_media_command() {
            debug!(%gesture, "Not a media command");
            return Ok(false);
        }

        let Some(player) = self.detect_active_player() else {
            info!(%gesture, "No media player detected for gesture");
            return Ok(false);
        };

        match gesture {
            GestureKind::PlayPause => self.play_pause(player),
            GestureKind::SwipeLeft => self.skip(player, false),
            GestureKind::SwipeRight => self.skip(player, true),
            GestureKind::SwipeUp => self.volume(true),
            GestureKind::SwipeDown => self.volume(false),
            GestureKind::SystemToggle => Ok(false),
        }
    }

    fn current_display_label(&self) -> PlayPauseLabel {
        let state = self.lock_state();
        let playing = state
            .active_player
            .and_then(|player| state.player_states.get(&player))
            .map_or(false, |s| *s == PlaybackState::Playing);
        if playing {
            PlayPauseLabel::Pause
        } else {
            PlayPauseLabel::Play
        }
    }
}
