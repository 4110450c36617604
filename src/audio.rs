//! Sound playback proxies
//!
//! Sounds are host-owned; the sandbox holds handles and a loaded flag fed by
//! a load notification callback. The metronome beats on the local scheduler
//! so tempo never depends on host round-trips.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::{Bridge, RemoteHandle};
use crate::events::Listeners;
use crate::timer::Scheduler;

/// Playback options sent alongside `Sound.create`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundOptions {
    pub auto_play: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loops: Option<u32>,
}

impl SoundOptions {
    pub fn auto_play() -> Self {
        Self {
            auto_play: true,
            loops: None,
        }
    }

    pub fn looping(mut self) -> Self {
        self.loops = Some(u32::MAX);
        self
    }
}

/// Proxy for one host-owned sound.
///
/// `play` before the load notification is dropped by the host; callers that
/// need play-on-load bind the `load` event.
pub struct Sound {
    handle: RemoteHandle,
    bridge: Arc<Bridge>,
    loaded: AtomicBool,
    listeners: Listeners<()>,
}

impl Sound {
    pub fn new(bridge: &Arc<Bridge>, url: &str, options: SoundOptions) -> Arc<Self> {
        let handle = bridge.fresh_handle("snd");
        let sound = Arc::new(Self {
            handle: handle.clone(),
            bridge: Arc::clone(bridge),
            loaded: AtomicBool::new(false),
            listeners: Listeners::new(),
        });

        let weak = Arc::downgrade(&sound);
        let token = bridge.register_once(move |_args| {
            if let Some(sound) = weak.upgrade() {
                sound.loaded.store(true, Ordering::SeqCst);
                sound.listeners.trigger("load", &());
            }
        });
        bridge.call(
            "Sound",
            "create",
            vec![
                json!(handle.as_str()),
                json!(url),
                serde_json::to_value(&options).unwrap_or(Value::Null),
                json!(token.as_str()),
            ],
        );
        sound
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn listeners(&self) -> &Listeners<()> {
        &self.listeners
    }

    pub fn play(&self) {
        self.bridge
            .call("Sound", "play", vec![json!(self.handle.as_str())]);
    }

    pub fn stop(&self) {
        self.bridge
            .call("Sound", "stop", vec![json!(self.handle.as_str())]);
    }
}

/// Default mixer layer used when a track is set without naming one.
pub const PRIMARY_LAYER: &str = "primary";

/// Named layers of looping background audio.
///
/// Setting a layer stops and replaces whatever that layer was playing;
/// other layers are untouched.
pub struct MusicMixer {
    bridge: Arc<Bridge>,
    layers: Mutex<HashMap<String, Arc<Sound>>>,
}

impl MusicMixer {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        Arc::new(Self {
            bridge: Arc::clone(bridge),
            layers: Mutex::new(HashMap::new()),
        })
    }

    /// Start `url` looping on `layer`, replacing the layer's current track.
    pub fn set(&self, layer: &str, url: &str) -> Arc<Sound> {
        let sound = Sound::new(&self.bridge, url, SoundOptions::auto_play().looping());
        debug!(layer, url, "music layer set");
        if let Some(previous) = self
            .layers
            .lock()
            .insert(layer.to_string(), Arc::clone(&sound))
        {
            previous.stop();
        }
        sound
    }

    /// Silence one layer. Unknown layers are a no-op.
    pub fn stop(&self, layer: &str) {
        if let Some(sound) = self.layers.lock().remove(layer) {
            sound.stop();
        }
    }

    /// Silence every layer.
    pub fn stop_all(&self) {
        for (_, sound) in self.layers.lock().drain() {
            sound.stop();
        }
    }

    pub fn active_layers(&self) -> Vec<String> {
        self.layers.lock().keys().cloned().collect()
    }
}

const METRONOME_CLICK: &str = "builtin:click.mp3";
const DEFAULT_BEAT: Duration = Duration::from_millis(100);

/// Repeating click driven entirely by the local scheduler.
///
/// `active` is the intent flag; `ticking` guards against overlapping beat
/// chains when start is called repeatedly. If the click sound has not loaded
/// yet, the chain starts on the load notification instead.
pub struct Metronome {
    this: Weak<Metronome>,
    sound: Arc<Sound>,
    scheduler: Arc<Scheduler>,
    delay: Mutex<Duration>,
    active: AtomicBool,
    ticking: AtomicBool,
}

impl Metronome {
    pub fn new(bridge: &Arc<Bridge>, scheduler: &Arc<Scheduler>) -> Arc<Self> {
        let sound = Sound::new(bridge, METRONOME_CLICK, SoundOptions::default());
        let metronome = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            sound: Arc::clone(&sound),
            scheduler: Arc::clone(scheduler),
            delay: Mutex::new(DEFAULT_BEAT),
            active: AtomicBool::new(false),
            ticking: AtomicBool::new(false),
        });

        let weak = metronome.this.clone();
        sound.listeners().one("load", move |_ctx, _| {
            if let Some(metronome) = weak.upgrade() {
                if metronome.active.load(Ordering::SeqCst) {
                    metronome.begin_chain();
                }
            }
        });
        metronome
    }

    /// Set the beat rate in beats per minute.
    pub fn set_frequency(&self, bpm: f64) {
        if bpm > 0.0 {
            *self.delay.lock() = Duration::from_millis((60_000.0 / bpm) as u64);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
        if !self.sound.is_loaded() {
            // The load handler resumes the chain.
            return;
        }
        self.begin_chain();
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn begin_chain(&self) {
        if self.ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        self.beat(std::time::Instant::now());
    }

    // Each beat schedules the next relative to its own logical fire time so
    // tempo does not drift with pump latency.
    fn beat(&self, now: std::time::Instant) {
        if !self.active.load(Ordering::SeqCst) {
            self.ticking.store(false, Ordering::SeqCst);
            return;
        }
        if self.sound.is_loaded() {
            self.sound.play();
        }
        let weak = self.this.clone();
        let delay = *self.delay.lock();
        self.scheduler.schedule_at(now + delay, move |fired_at| {
            if let Some(metronome) = weak.upgrade() {
                metronome.beat(fired_at);
            }
        });
    }
}
