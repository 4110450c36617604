//! Slide engine
//!
//! A presentation is a set of named slides and one manager that moves
//! between them. Transitions negotiate resource carry-over: the incoming
//! slide steals what its configuration says to keep (media, the bubble
//! queue, the metronome) before the outgoing slide tears the rest down, so
//! carried resources never flicker through a destroy-and-recreate cycle.

pub mod config;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::{Metronome, MusicMixer, Sound, SoundOptions, PRIMARY_LAYER};
use crate::bridge::Bridge;
use crate::bubbles::{Bubble, BubbleQueue, BubbleStyle};
use crate::error::{Result, StageError};
use crate::layout::{Container, Sidebar};
use crate::proxy::media::Media;
use crate::slides::config::{
    BubbleSpec, CompleteDirective, MediaDirective, MetronomeDirective, MusicDirective, SlideConfig,
};
use crate::timer::display::TimerDisplay;
use crate::timer::{Scheduler, Timer, TimerOptions};

/// Everything a slide needs to build and destroy its presentation.
#[derive(Clone)]
pub struct SlideContext {
    pub bridge: Arc<Bridge>,
    pub scheduler: Arc<Scheduler>,
    pub container: Arc<dyn Container>,
    pub manager: Weak<SlideManager>,
    pub music: Arc<MusicMixer>,
}

/// One slide's lifecycle.
///
/// `setup` builds the slide from nothing; `teardown` destroys whatever the
/// slide still owns. `transition` runs when the slide replaces another and
/// may steal the predecessor's resources through the `take_*` hooks before
/// letting it tear down.
pub trait Slide: Send + Sync {
    fn setup(&self, cx: &SlideContext);

    fn teardown(&self, cx: &SlideContext);

    fn transition(&self, cx: &SlideContext, old: &dyn Slide) {
        old.teardown(cx);
        self.setup(cx);
    }

    /// Surrender the slide's media element, if it has one.
    fn take_media(&self) -> Option<Arc<Media>> {
        None
    }

    /// Surrender the slide's bubble queue, if it has one.
    fn take_bubble_queue(&self) -> Option<Arc<BubbleQueue>> {
        None
    }

    /// Surrender the slide's metronome, if it has one.
    fn take_metronome(&self) -> Option<Arc<Metronome>> {
        None
    }
}

/// Named-slide registry and navigation.
pub struct SlideManager {
    cx: SlideContext,
    slides: Mutex<HashMap<String, Arc<dyn Slide>>>,
    current: Mutex<Option<Arc<dyn Slide>>>,
    current_name: Mutex<Option<String>>,
}

impl SlideManager {
    pub fn new(
        bridge: &Arc<Bridge>,
        scheduler: &Arc<Scheduler>,
        container: Arc<dyn Container>,
        music: &Arc<MusicMixer>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            cx: SlideContext {
                bridge: Arc::clone(bridge),
                scheduler: Arc::clone(scheduler),
                container,
                manager: this.clone(),
                music: Arc::clone(music),
            },
            slides: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            current_name: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &SlideContext {
        &self.cx
    }

    /// Register a slide under a name, replacing any previous registration.
    pub fn add_slide(&self, name: &str, slide: Arc<dyn Slide>) {
        self.slides.lock().insert(name.to_string(), slide);
    }

    /// Register a whole declarative deck.
    pub fn add_slides(&self, deck: HashMap<String, SlideConfig>) {
        let mut slides = self.slides.lock();
        for (name, config) in deck {
            slides.insert(name, InteractiveSlide::new(config));
        }
    }

    pub fn current_name(&self) -> Option<String> {
        self.current_name.lock().clone()
    }

    /// Navigate to a named slide.
    ///
    /// The current slide runs its transition against the incoming one; the
    /// first navigation is a plain setup.
    pub fn go(&self, name: &str) -> Result<()> {
        let slide = self
            .slides
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StageError::UnknownSlide(name.to_string()))?;
        self.present(slide, Some(name));
        info!(slide = name, "slide shown");
        Ok(())
    }

    /// Show a slide value directly, without going through the registry.
    pub fn show(&self, slide: Arc<dyn Slide>) {
        self.present(slide, None);
        info!("anonymous slide shown");
    }

    fn present(&self, slide: Arc<dyn Slide>, name: Option<&str>) {
        // The current lock is not held across slide code; a handler fired
        // during the transition may navigate again.
        let previous = self.current.lock().clone();
        match previous {
            Some(old) => slide.transition(&self.cx, old.as_ref()),
            None => slide.setup(&self.cx),
        }
        *self.current.lock() = Some(slide);
        *self.current_name.lock() = name.map(str::to_string);
    }
}

/// Declaratively configured slide.
pub struct InteractiveSlide {
    config: SlideConfig,
    media: Mutex<Option<Arc<Media>>>,
    queue: Mutex<Option<Arc<BubbleQueue>>>,
    metronome: Mutex<Option<Arc<Metronome>>>,
    sound: Mutex<Option<Arc<Sound>>>,
    sidebar: Mutex<Option<Arc<Sidebar>>>,
    timer: Mutex<Option<Arc<Timer>>>,
    display: Mutex<Option<Arc<TimerDisplay>>>,
}

impl InteractiveSlide {
    pub fn new(config: SlideConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            media: Mutex::new(None),
            queue: Mutex::new(None),
            metronome: Mutex::new(None),
            sound: Mutex::new(None),
            sidebar: Mutex::new(None),
            timer: Mutex::new(None),
            display: Mutex::new(None),
        })
    }

    fn create_media(&self, cx: &SlideContext, source: &str) {
        match Media::new(&cx.bridge, source) {
            Ok(media) => {
                cx.container.add_child(Arc::clone(&media) as _);
                *self.media.lock() = Some(media);
            }
            Err(err) => warn!(%err, source, "media creation failed"),
        }
    }

    fn adopt_queue(&self, cx: &SlideContext, adopted: Option<Arc<BubbleQueue>>) {
        let queue = match adopted {
            Some(queue) => {
                queue.page_change();
                queue
            }
            None => {
                let queue = BubbleQueue::new(&cx.bridge);
                cx.container.add_child(Arc::clone(&queue) as _);
                queue
            }
        };
        self.init_bubbles(cx, &queue);
        *self.queue.lock() = Some(queue);
    }

    fn init_bubbles(&self, cx: &SlideContext, queue: &Arc<BubbleQueue>) {
        if let Some(text) = &self.config.text {
            queue.add_bubble(Bubble::text(&cx.bridge, text, BubbleStyle::default()));
        }
        if !self.config.buttons.0.is_empty() {
            queue.add_bubble(Bubble::prompt(
                &cx.bridge,
                &self.config.buttons.0,
                cx.manager.clone(),
                BubbleStyle::default(),
            ));
        }
        for spec in &self.config.bubbles {
            let bubble = match spec {
                BubbleSpec::Text { text, style } => Bubble::text(&cx.bridge, text, *style),
                BubbleSpec::Buttons { buttons, style } => {
                    Bubble::prompt(&cx.bridge, &buttons.0, cx.manager.clone(), *style)
                }
            };
            queue.add_bubble(bubble);
        }
    }

    fn adopt_metronome(&self, cx: &SlideContext, adopted: Option<Arc<Metronome>>) {
        let directive = self.config.metronome;
        if directive == MetronomeDirective::Off {
            return;
        }
        let metronome = adopted.unwrap_or_else(|| Metronome::new(&cx.bridge, &cx.scheduler));
        if let MetronomeDirective::Bpm(bpm) = directive {
            metronome.set_frequency(bpm);
        }
        metronome.start();
        *self.metronome.lock() = Some(metronome);
    }

    fn start(&self, cx: &SlideContext) {
        if let Some(url) = &self.config.sound {
            *self.sound.lock() = Some(Sound::new(&cx.bridge, url, SoundOptions::auto_play()));
        }

        match &self.config.music {
            MusicDirective::Unchanged => {}
            MusicDirective::Stop => cx.music.stop(PRIMARY_LAYER),
            MusicDirective::Track(url) => {
                cx.music.set(PRIMARY_LAYER, url);
            }
        }

        if let Some(delay) = &self.config.delay {
            let complete = delay.complete.clone();
            let manager = cx.manager.clone();
            let timer = Timer::new(
                &cx.scheduler,
                TimerOptions::new(Duration::from_millis(delay.duration))
                    .manual_start()
                    .on_complete(move || match complete {
                        Some(CompleteDirective::Goto(slide)) => {
                            let Some(manager) = manager.upgrade() else { return };
                            if let Err(err) = manager.go(&slide) {
                                warn!(%err, "delayed navigation failed");
                            }
                        }
                        Some(CompleteDirective::Handler(f)) => f(),
                        None => {}
                    }),
            );

            if let Some(style) = delay.style.countdown_style() {
                let sidebar = Sidebar::new(&cx.bridge);
                cx.container.add_child(Arc::clone(&sidebar) as _);
                let display = TimerDisplay::new(&cx.bridge, style);
                display.attach(&timer);
                sidebar.add_child(Arc::clone(&display) as _);
                *self.sidebar.lock() = Some(sidebar);
                *self.display.lock() = Some(display);
            }
            // Started after the face attaches so the immediate first tick
            // reaches it.
            timer.start();
            *self.timer.lock() = Some(timer);
        }

        if let Some(hook) = &self.config.on_start {
            hook();
        }
    }
}

impl Slide for InteractiveSlide {
    fn setup(&self, cx: &SlideContext) {
        if let MediaDirective::Source(source) = &self.config.media {
            self.create_media(cx, source);
        }
        self.adopt_queue(cx, None);
        self.adopt_metronome(cx, None);
        self.start(cx);
    }

    fn transition(&self, cx: &SlideContext, old: &dyn Slide) {
        let media = match self.config.media {
            MediaDirective::Keep => old.take_media(),
            _ => None,
        };
        let queue = old.take_bubble_queue();
        let metronome = match self.config.metronome {
            MetronomeDirective::Keep | MetronomeDirective::Bpm(_) => old.take_metronome(),
            _ => None,
        };

        old.teardown(cx);

        match &self.config.media {
            MediaDirective::Keep => {
                if media.is_none() {
                    warn!("media carry-over requested but the previous slide had none");
                }
                *self.media.lock() = media;
            }
            MediaDirective::Source(source) => self.create_media(cx, source),
            MediaDirective::None => {}
        }
        self.adopt_queue(cx, queue);
        self.adopt_metronome(cx, metronome);
        self.start(cx);
    }

    /// Teardown is idempotent; resources stolen by a successor are already
    /// gone from the slots and stay untouched.
    fn teardown(&self, cx: &SlideContext) {
        if let Some(media) = self.media.lock().take() {
            cx.container.remove_child(media.as_ref());
        }
        if let Some(queue) = self.queue.lock().take() {
            cx.container.remove_child(queue.as_ref());
        }
        if let Some(metronome) = self.metronome.lock().take() {
            metronome.stop();
        }
        if let Some(timer) = self.timer.lock().take() {
            timer.stop();
        }
        let display = self.display.lock().take();
        if let Some(sidebar) = self.sidebar.lock().take() {
            if let Some(display) = display {
                sidebar.remove_child(display.as_ref());
            }
            cx.container.remove_child(sidebar.as_ref());
        }
        self.sound.lock().take();
    }

    fn take_media(&self) -> Option<Arc<Media>> {
        self.media.lock().take()
    }

    fn take_bubble_queue(&self) -> Option<Arc<BubbleQueue>> {
        self.queue.lock().take()
    }

    fn take_metronome(&self) -> Option<Arc<Metronome>> {
        self.metronome.lock().take()
    }
}
