use beep::beep;
use thiserror::Error;

/// the host's tone device refused us
#[derive(Debug, Error)]
#[error("sound device: {0}")]
pub struct SoundError(String);

/// drives the tone the sound timer asks for
pub trait Sound {
    fn beep(&mut self) -> Result<(), SoundError>;
    fn stop(&mut self) -> Result<(), SoundError>;
}

const SIMPLEBEEP_PITCH: u16 = 2093; // C

pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    pub fn new() -> Self {
        SimpleBeep { is_beeping: false }
    }
}

impl Default for SimpleBeep {
    fn default() -> Self {
        SimpleBeep::new()
    }
}

impl Sound for SimpleBeep {
    fn beep(&mut self) -> Result<(), SoundError> {
        if !self.is_beeping {
            beep(SIMPLEBEEP_PITCH).map_err(|e| SoundError(e.to_string()))?;
            self.is_beeping = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SoundError> {
        if self.is_beeping {
            beep(0).map_err(|e| SoundError(e.to_string()))?;
            self.is_beeping = false;
        }
        Ok(())
    }
}

pub struct Mute {}

impl Mute {
    pub fn new() -> Self {
        Mute {}
    }
}

impl Default for Mute {
    fn default() -> Self {
        Mute::new()
    }
}

impl Sound for Mute {
    fn beep(&mut self) -> Result<(), SoundError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SoundError> {
        Ok(())
    }
}
