use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use crossterm::event::{poll, read, Event, KeyCode};
use crossterm::terminal;
use log::warn;

use chip8_emu::channel::{ChannelConfig, FrameChannel};
use chip8_emu::display::MonoTermDisplay;
use chip8_emu::input::{Keypad, CHIP8_CONVENTIONAL_KEYMAP};
use chip8_emu::interpreter::{Chip8Interpreter, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use chip8_emu::scheduler::{RedrawHost, RedrawScheduler};
use chip8_emu::sound::Mute;

/// instruction rate, tuned to feel like a contemporary machine
const INSTRUCTIONS_PER_SECOND: u32 = 18_000;

/// host repaint cadence when nothing asked for more
const REPAINT_INTERVAL: Duration = Duration::from_micros(16_667);

/// a terminal only reports key presses, so a key is considered released
/// once its auto-repeat stops arriving
const KEY_RELEASE_AFTER: Duration = Duration::from_millis(200);

/// The terminal event loop's deferred repaint flag. `request_redraw` only
/// marks the flag; the extra pass happens on the next trip around the loop,
/// never from inside the current one.
struct EventLoopRedraw {
    pending: bool,
}

impl RedrawHost for EventLoopRedraw {
    fn request_redraw(&mut self) {
        self.pending = true;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let rom_path = std::env::args()
        .nth(1)
        .context("usage: chip8-emu <romfile>")?;
    let mut rom = File::open(&rom_path).with_context(|| format!("opening {}", rom_path))?;

    // the session: one channel, one producer thread, presentation on this
    // thread
    let channel = FrameChannel::open(ChannelConfig::new(DISPLAY_WIDTH, DISPLAY_HEIGHT));
    let keypad = Arc::new(Keypad::new());
    let mut display = MonoTermDisplay::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)?;
    let scheduler = RedrawScheduler::new(Arc::clone(&channel));

    let producer = {
        let channel = Arc::clone(&channel);
        let keypad = Arc::clone(&keypad);
        thread::spawn(move || -> Result<(), anyhow::Error> {
            let mut interpreter = Chip8Interpreter::new(channel, keypad, Box::new(Mute::new()))?;
            interpreter.load_program(&mut rom)?;
            interpreter.main_loop(INSTRUCTIONS_PER_SECOND)?;
            Ok(())
        })
    };

    terminal::enable_raw_mode()?;
    let mut run = || -> anyhow::Result<()> {
        let keymap: HashMap<char, u8> = HashMap::from(CHIP8_CONVENTIONAL_KEYMAP);
        let mut host = EventLoopRedraw { pending: false };
        let mut held: HashMap<u8, Instant> = HashMap::new();
        let mut last_paint = Instant::now() - REPAINT_INTERVAL;

        loop {
            // a dead producer (bad ROM, pipeline error) means nothing more
            // to present; fall through to join and report it
            if producer.is_finished() {
                return Ok(());
            }

            // pass key events straight through to the interpreter's pad
            while poll(Duration::from_millis(0))? {
                if let Event::Key(evt) = read()? {
                    match evt.code {
                        KeyCode::Esc => return Ok(()),
                        KeyCode::Char(c) => match keymap.get(&c) {
                            Some(&key) => {
                                keypad.key_down(key);
                                held.insert(key, Instant::now());
                            }
                            None => warn!("can't map {:?} to a COSMAC key", c),
                        },
                        _ => {}
                    }
                }
            }
            held.retain(|&key, pressed_at| {
                if pressed_at.elapsed() > KEY_RELEASE_AFTER {
                    keypad.key_up(key);
                    false
                } else {
                    true
                }
            });

            // repaint on the timer, plus any pass the scheduler re-requested
            // to drain backlog
            if host.pending || last_paint.elapsed() >= REPAINT_INTERVAL {
                host.pending = false;
                scheduler.run_pass(&mut display, &mut host)?;
                last_paint = Instant::now();
            }

            spin_sleep::sleep(Duration::from_millis(1));
        }
    };
    let outcome = run();
    terminal::disable_raw_mode()?;

    // stop the producer: close() sends a waiting push home with a closed
    // outcome, so join can't hang
    channel.close();
    producer
        .join()
        .map_err(|_| anyhow!("interpreter thread panicked"))??;

    // shove some junk on stdout to stop the cli messing up the last frame
    for _ in 0..12 {
        println!();
    }
    outcome
}
