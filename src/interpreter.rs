//! # interpreter
//!
//! The CHIP-8 machine itself, run as the frame producer on its own thread.
//! It owns one mutable working plane that CLS/DRW overwrite in place; a
//! tick that changed the plane publishes a *copy* through the frame
//! channel, because the channel may hold a published frame across several
//! presentation passes while we are already drawing the next tick into the
//! working plane. The channel's bounded push is also our throttle: when the
//! presenter falls behind, the push suspends us instead of letting frames
//! pile up.

use std::io;
use std::sync::Arc;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::channel::{FrameChannel, PushError};
use crate::frame::{Frame, FrameAllocError};
use crate::input::Keypad;
use crate::memory::{Chip8MemoryMap, MemoryMap};
use crate::sound::{Sound, SoundError};

/// the machine's fixed pixel plane
pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

/// delay and sound timers count down at 60Hz regardless of instruction rate
const TIMER_HZ: u32 = 60;

/// nesting depth of CALL
const STACK_DEPTH: usize = 16;

/// what can take the producer down
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("frame pipeline: {0}")]
    Pipeline(#[from] PushError),
    #[error(transparent)]
    Frame(#[from] FrameAllocError),
    #[error("program load: {0}")]
    Load(#[from] io::Error),
    #[error(transparent)]
    Sound(#[from] SoundError),
}

pub struct Chip8Interpreter {
    memory: Chip8MemoryMap,
    channel: Arc<FrameChannel>,
    keypad: Arc<Keypad>,
    sound: Box<dyn Sound + Send>,
    registers: [u8; 16],
    i: u16,
    program_counter: u16,
    stack: [u16; STACK_DEPTH],
    stack_pointer: usize,
    delay_timer: u8,
    sound_timer: u8,
    working: Frame,
    display_dirty: bool,
    rng: StdRng,
}

impl Chip8Interpreter {
    pub fn new(
        channel: Arc<FrameChannel>,
        keypad: Arc<Keypad>,
        sound: Box<dyn Sound + Send>,
    ) -> Result<Chip8Interpreter, EmulatorError> {
        let memory = Chip8MemoryMap::new()?;
        let working = Frame::new(channel.config().width, channel.config().height)?;
        let mut i = Chip8Interpreter {
            memory,
            channel,
            keypad,
            sound,
            registers: [0; 16],
            i: 0x0000,
            program_counter: 0x0000,
            stack: [0; STACK_DEPTH],
            stack_pointer: 0,
            delay_timer: 0x00,
            sound_timer: 0x00,
            working,
            display_dirty: false,
            rng: StdRng::from_entropy(),
        };
        i.program_counter = i.memory.program_addr;
        Ok(i)
    }

    /// load a chip8 program
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> Result<(), EmulatorError> {
        self.memory.load_program(reader)?;
        debug!("program loaded at 0x{:03x}", self.memory.program_addr);
        Ok(())
    }

    /// Run the machine at roughly `instructions_per_second`: bursts of
    /// instructions at the timer rate, then sleep the remainder, so
    /// wallclock timing looks right even though individual instructions
    /// don't. Returns cleanly once the session closes the channel.
    pub fn main_loop(&mut self, instructions_per_second: u32) -> Result<(), EmulatorError> {
        let burst = (instructions_per_second / TIMER_HZ).max(1);
        let mut ticker = spin_sleep::LoopHelper::builder().build_with_target_rate(TIMER_HZ as f64);
        loop {
            ticker.loop_start();
            for _ in 0..burst {
                self.step();
            }
            self.tick_timers()?;
            if !self.publish_if_dirty()? || self.channel.is_closed() {
                debug!("frame channel closed, interpreter stopping");
                return Ok(());
            }
            ticker.loop_sleep();
        }
    }

    /// fetch, decode and execute a single instruction
    pub fn step(&mut self) {
        let opcode = self.memory.get_word(self.program_counter);
        self.program_counter += 2;

        let x = ((opcode & 0x0f00) >> 8) as usize;
        let y = ((opcode & 0x00f0) >> 4) as usize;
        let n = (opcode & 0x000f) as u8;
        let nn = (opcode & 0x00ff) as u8;
        let nnn = opcode & 0x0fff;

        match (opcode & 0xf000) >> 12 {
            0x0 => match nn {
                // 00E0 - CLS
                0xe0 => {
                    self.working.plane_mut().fill(0);
                    self.display_dirty = true;
                }
                // 00EE - RET
                0xee => {
                    self.stack_pointer -= 1;
                    self.program_counter = self.stack[self.stack_pointer];
                }
                // 0nnn - SYS, not implemented in modern interpreters
                _ => warn!("ignoring SYS call {:04x?}", opcode),
            },
            // 1nnn - JP addr
            0x1 => self.program_counter = nnn,
            // 2nnn - CALL addr
            0x2 => {
                self.stack[self.stack_pointer] = self.program_counter;
                self.stack_pointer += 1;
                self.program_counter = nnn;
            }
            // 3xkk - SE Vx, byte
            0x3 => {
                if self.registers[x] == nn {
                    self.program_counter += 2;
                }
            }
            // 4xkk - SNE Vx, byte
            0x4 => {
                if self.registers[x] != nn {
                    self.program_counter += 2;
                }
            }
            // 5xy0 - SE Vx, Vy
            0x5 => {
                if self.registers[x] == self.registers[y] {
                    self.program_counter += 2;
                }
            }
            // 6xkk - LD Vx, byte
            0x6 => self.registers[x] = nn,
            // 7xkk - ADD Vx, byte
            0x7 => self.registers[x] = self.registers[x].wrapping_add(nn),
            0x8 => match n {
                // 8xy0 - LD Vx, Vy
                0x0 => self.registers[x] = self.registers[y],
                // 8xy1 - OR Vx, Vy
                0x1 => self.registers[x] |= self.registers[y],
                // 8xy2 - AND Vx, Vy
                0x2 => self.registers[x] &= self.registers[y],
                // 8xy3 - XOR Vx, Vy
                0x3 => self.registers[x] ^= self.registers[y],
                // 8xy4 - ADD Vx, Vy
                0x4 => {
                    let (sum, carry) = self.registers[x].overflowing_add(self.registers[y]);
                    self.registers[x] = sum;
                    self.registers[0xf] = u8::from(carry);
                }
                // 8xy5 - SUB Vx, Vy; VF is NOT borrow
                0x5 => {
                    let (diff, borrow) = self.registers[x].overflowing_sub(self.registers[y]);
                    self.registers[x] = diff;
                    self.registers[0xf] = u8::from(!borrow);
                }
                // 8xy6 - SHR Vx
                0x6 => {
                    let vx = self.registers[x];
                    self.registers[x] = vx >> 1;
                    self.registers[0xf] = vx & 0x1;
                }
                // 8xy7 - SUBN Vx, Vy
                0x7 => {
                    let (diff, borrow) = self.registers[y].overflowing_sub(self.registers[x]);
                    self.registers[x] = diff;
                    self.registers[0xf] = u8::from(!borrow);
                }
                // 8xyE - SHL Vx
                0xe => {
                    let vx = self.registers[x];
                    self.registers[x] = vx << 1;
                    self.registers[0xf] = vx >> 7;
                }
                _ => warn!("unknown arithmetic op {:04x?}", opcode),
            },
            // 9xy0 - SNE Vx, Vy
            0x9 => {
                if self.registers[x] != self.registers[y] {
                    self.program_counter += 2;
                }
            }
            // Annn - LD I, addr
            0xa => self.i = nnn,
            // Bnnn - JP V0, addr
            0xb => self.program_counter = nnn + self.registers[0] as u16,
            // Cxkk - RND Vx, byte
            0xc => self.registers[x] = self.rng.gen::<u8>() & nn,
            // Dxyn - DRW Vx, Vy, n
            0xd => self.draw_sprite(x, y, n),
            0xe => match nn {
                // Ex9E - SKP Vx
                0x9e => {
                    if self.keypad.is_pressed(self.registers[x]) {
                        self.program_counter += 2;
                    }
                }
                // ExA1 - SKNP Vx
                0xa1 => {
                    if !self.keypad.is_pressed(self.registers[x]) {
                        self.program_counter += 2;
                    }
                }
                _ => warn!("unknown key op {:04x?}", opcode),
            },
            0xf => match nn {
                // Fx07 - LD Vx, DT
                0x07 => self.registers[x] = self.delay_timer,
                // Fx0A - LD Vx, K; no key held means retry this instruction
                // next tick
                0x0a => match self.keypad.first_pressed() {
                    Some(key) => self.registers[x] = key,
                    None => self.program_counter -= 2,
                },
                // Fx15 - LD DT, Vx
                0x15 => self.delay_timer = self.registers[x],
                // Fx18 - LD ST, Vx
                0x18 => self.sound_timer = self.registers[x],
                // Fx1E - ADD I, Vx
                0x1e => self.i = self.i.wrapping_add(self.registers[x] as u16),
                // Fx29 - LD F, Vx
                0x29 => self.i = self.memory.font_sprite_addr(self.registers[x]),
                // Fx33 - LD B, Vx
                0x33 => {
                    let vx = self.registers[x];
                    let bcd = [vx / 100, (vx / 10) % 10, vx % 10];
                    self.memory.get_rw_slice(self.i, 3).copy_from_slice(&bcd);
                }
                // Fx55 - LD [I], Vx
                0x55 => {
                    self.memory
                        .get_rw_slice(self.i, x + 1)
                        .copy_from_slice(&self.registers[..=x]);
                    self.i += x as u16 + 1;
                }
                // Fx65 - LD Vx, [I]
                0x65 => {
                    self.registers[..=x]
                        .copy_from_slice(self.memory.get_ro_slice(self.i, x + 1));
                    self.i += x as u16 + 1;
                }
                _ => warn!("unknown misc op {:04x?}", opcode),
            },
            _ => unreachable!("opcode is masked to one nibble"),
        }
    }

    /// XOR an n-row sprite from memory at I onto the working plane; VF
    /// reports any lit pixel going dark. The sprite origin wraps at the
    /// plane edges, the body clips.
    fn draw_sprite(&mut self, x: usize, y: usize, rows: u8) {
        let w = self.working.width();
        let h = self.working.height();
        let x0 = self.registers[x] as usize % w;
        let y0 = self.registers[y] as usize % h;
        let sprite = self.memory.get_ro_slice(self.i, rows as usize).to_vec();

        self.registers[0xf] = 0;
        let plane = self.working.plane_mut();
        for (row, line) in sprite.iter().enumerate() {
            let py = y0 + row;
            if py >= h {
                break;
            }
            for bit in 0..8 {
                if line & (0x80 >> bit) == 0 {
                    continue;
                }
                let px = x0 + bit;
                if px >= w {
                    continue;
                }
                let cell = &mut plane[px + py * w];
                if *cell > 0 {
                    self.registers[0xf] = 1;
                }
                *cell ^= 1;
            }
        }
        self.display_dirty = true;
    }

    /// Push a copy of the working plane if anything changed since the last
    /// publish; may suspend here while the channel is full. Ok(false) once
    /// the channel has closed: the session is over and the producer should
    /// wind down.
    fn publish_if_dirty(&mut self) -> Result<bool, EmulatorError> {
        if !self.display_dirty {
            return Ok(true);
        }
        let snapshot = self.working.snapshot()?;
        match self.channel.push(snapshot) {
            Ok(()) => {
                self.display_dirty = false;
                Ok(true)
            }
            Err(PushError::Closed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// one 60Hz timer tick
    fn tick_timers(&mut self) -> Result<(), EmulatorError> {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }
        if self.sound_timer > 0 {
            self.sound.beep()?;
            self.sound_timer -= 1;
            if self.sound_timer == 0 {
                self.sound.stop()?;
            }
        }
        Ok(())
    }
}
