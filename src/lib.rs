//! Sandboxed presentation runtime.
//!
//! Runs interactive slide shows inside a sandbox whose only capability is an
//! asynchronous message channel to a trusted host. The host owns every real
//! resource (elements, media, sound, drawing surfaces); the sandbox holds
//! proxies keyed by opaque handles and drives them through fire-and-forget
//! calls, with replies and events correlated by callback tokens.
//!
//! The embedder builds a [`runtime::Runtime`], wires the returned
//! [`runtime::HostEndpoint`] to its transport, constructs a
//! [`layout::Viewport`] and a [`slides::SlideManager`], registers a deck and
//! pumps. Everything else, from bubble dismissal to metronome beats, happens
//! inside pump iterations.

pub mod audio;
pub mod bridge;
pub mod bubbles;
pub mod error;
pub mod events;
pub mod layout;
pub mod preload;
pub mod proxy;
pub mod runtime;
pub mod slides;
pub mod timer;

pub use audio::{Metronome, MusicMixer, Sound, SoundOptions};
pub use bridge::{Bridge, CallbackToken, InboundMessage, OutboundCall, RemoteHandle};
pub use bubbles::{AutoClose, Bubble, BubbleQueue, BubbleStyle};
pub use error::{Result, StageError};
pub use events::{EventContext, HandlerId, Listeners};
pub use layout::{Container, Sidebar, StandardContainer, Viewport};
pub use preload::{PreloadEvent, Preloader};
pub use proxy::canvas::Canvas;
pub use proxy::media::Media;
pub use proxy::{AnimateOptions, Element, Layoutable, Rect};
pub use runtime::{HostEndpoint, Runtime};
pub use slides::config::{load_slide_file, SlideConfig};
pub use slides::{InteractiveSlide, Slide, SlideContext, SlideManager};
pub use timer::display::{CountdownStyle, TimerDisplay};
pub use timer::{Scheduler, Timer, TimerEvent, TimerOptions};
