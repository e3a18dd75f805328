//!
//! ## Design
//!
//! * the interpreter runs flat out on its own thread; the host repaints
//!   whenever it feels like it (damage, resize, timer). the two must never
//!   share a mutable pixel plane
//! * frames therefore move through a small bounded channel: the interpreter
//!   publishes a copy of its working plane and the presentation side peeks
//!   the oldest copy out when the host asks it to paint
//! * the channel keeps the last frame queued even after it has been shown,
//!   because repaints arrive with no new tick attached (resizing fires
//!   dozens) and a blank plane between ticks looks like a dead emulator
//! * when the presenter lags, the channel fills and `push` suspends the
//!   interpreter; nothing is dropped and nothing grows without bound
//! * when frames queue up faster than damage events arrive, the scheduler
//!   asks the host for extra passes until the backlog is back at the floor;
//!   asking is deferred through the host's own loop, never a recursive
//!   paint
//! * display, input and sound sit behind traits so the interpreter doesn't
//!   need to know how any of them work
//!
//! Model
//!
//! interpreter thread                      host/presentation side
//!  |-- step() x N per tick                 |-- key events -> Keypad
//!  |-- tick timers -> Sound                |-- damage/timer -> run_pass
//!  |-- working plane changed?              |     |-- peek_latest
//!  |     `-- push(snapshot) --[channel]--> |     |-- Presenter::paint
//!  `-- blocked while channel full          |     `-- backlog above floor?
//!                                          |           `-- request_redraw
//!                                          `-- close() on quit, which also
//!                                              unblocks a waiting push
pub mod channel;
pub mod display;
pub mod frame;
pub mod input;
pub mod interpreter;
pub mod memory;
pub mod scheduler;
pub mod sound;
