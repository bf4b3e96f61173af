//! I2C driver for the MPL115A2 barometric pressure and temperature sensor.
//! This sensor is available as a breakout board and answers on the fixed
//! I2C address 0x60.
//!
//! The device stores four factory-programmed calibration coefficients which
//! are read once per power cycle and combined with the raw 10-bit ADC counts
//! to produce compensated readings. Construct the driver with a delay
//! provider, then bind an I2C bus with [Mpl115a2::init] before reading:
//!
//! ```rust, ignore
//! use mpl115a2::*;
//!
//! let mut sensor = Mpl115a2::new(delay);
//! if !sensor.init(i2c)? {
//!     // no device acknowledged on the bus
//! }
//! let (pressure, temperature) = sensor.get_pressure_and_temperature()?;
//! ```
//!
//! Pressure is reported in kPa and temperature in degrees celsius. Each
//! reading triggers a conversion on the device and blocks for 5 ms while
//! the ADC settles. When both values are wanted, use
//! [Mpl115a2::get_pressure_and_temperature]; the single-value accessors run
//! the same full cycle and discard the unused half, doubling bus traffic if
//! called back to back.
//!
//! The coefficients are re-read on every call to [Mpl115a2::init], so the
//! driver can be rebound to a fresh bus after a power cycle of the sensor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(not(test), no_std)]

extern crate embedded_hal as hal;

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c::{Write, WriteRead};

/// Default I2C address of the MPL115A2.
pub const DEFAULT_ADDRESS: u8 = 0x60;

const PRESSURE_MSB: u8 = 0x00;
// const TEMP_MSB: u8 = 0x02;
const A0_MSB: u8 = 0x04;
const CONVERT: u8 = 0x12;

// The datasheet guarantees conversion completes within 3 ms.
const CONVERSION_DELAY_MS: u8 = 5;

/// Errors returned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// A bus transaction failed. The wrapped error comes from the I2C
    /// implementation; the driver does not retry.
    I2c(E),
    /// A reading was requested before a successful call to [Mpl115a2::init].
    NotInitialized,
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Error::I2c(err)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    a0: f32,
    b1: f32,
    b2: f32,
    c12: f32,
}

impl Coefficients {
    /// Decode the 8-byte coefficient block read from A0_MSB onwards.
    ///
    /// The block holds four big-endian signed 16-bit words: a0 (3
    /// fractional bits), b1 (13), b2 (14) and c12, which carries two zero
    /// padding bits at the bottom and 22 fractional bits after the shift.
    fn from_raw(raw: &[u8; 8]) -> Self {
        let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]);
        Coefficients {
            a0: word(0) as f32 / 8.0,
            b1: word(2) as f32 / 8192.0,
            b2: word(4) as f32 / 16384.0,
            c12: (word(6) >> 2) as f32 / 4194304.0,
        }
    }
}

/// The MPL115A2 barometer.
///
/// Generic over the I2C bus and the delay provider. The bus is not bound at
/// construction; call [Mpl115a2::init] before taking readings.
#[derive(Debug)]
pub struct Mpl115a2<I2C, D> {
    i2c: Option<I2C>,
    delay: D,
    address: u8,
    coefficients: Coefficients,
}

impl<I2C, D, E> Mpl115a2<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    /// Create a driver with no bus bound and zeroed coefficients.
    pub fn new(delay: D) -> Self {
        Mpl115a2 {
            i2c: None,
            delay,
            address: DEFAULT_ADDRESS,
            coefficients: Coefficients::default(),
        }
    }

    /// Bind an I2C bus on the default address and read the calibration
    /// coefficients from the device.
    ///
    /// Returns `Ok(false)` if no device acknowledged the address; the
    /// stored coefficients are left untouched in that case and readings
    /// must not be trusted until a later call returns `Ok(true)`. Any
    /// previously bound bus is dropped before the new one is probed, so
    /// the driver may be re-initialised freely.
    pub fn init(&mut self, i2c: I2C) -> Result<bool, Error<E>> {
        self.init_with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Same as [Mpl115a2::init] with an explicit device address.
    pub fn init_with_address(&mut self, i2c: I2C, address: u8) -> Result<bool, Error<E>> {
        self.i2c = Some(i2c);
        self.address = address;
        if self.probe().is_err() {
            return Ok(false);
        }
        self.read_coefficients()?;
        Ok(true)
    }

    /// Consume the driver and hand back the bus, if one was bound.
    pub fn release(self) -> Option<I2C> {
        self.i2c
    }

    /// Trigger a conversion and read both compensated values, pressure in
    /// kPa and temperature in degrees celsius.
    ///
    /// Blocks for 5 ms while the ADC settles, then fetches both raw counts
    /// in a single bus round trip. Prefer this over calling
    /// [Mpl115a2::get_pressure] and [Mpl115a2::get_temperature] back to
    /// back when both values are needed.
    pub fn get_pressure_and_temperature(&mut self) -> Result<(f32, f32), Error<E>> {
        let address = self.address;
        self.bus()?.write(address, &[CONVERT, 0x00])?;
        self.delay.delay_ms(CONVERSION_DELAY_MS);

        let mut raw = [0u8; 4];
        self.bus()?.write_read(address, &[PRESSURE_MSB], &mut raw)?;
        // 10-bit ADC counts, left justified in 16 bits
        let pressure = (u16::from_be_bytes([raw[0], raw[1]]) >> 6) as f32;
        let temp = (u16::from_be_bytes([raw[2], raw[3]]) >> 6) as f32;

        // Evaluation sequence from the datasheet, p.6
        let cal = self.coefficients;
        let pcomp = cal.a0 + (cal.b1 + cal.c12 * temp) * pressure + cal.b2 * temp;

        let pressure_kpa = (65.0 / 1023.0) * pcomp + 50.0;
        let temperature_c = (temp - 498.0) / -5.35 + 25.0;
        Ok((pressure_kpa, temperature_c))
    }

    /// Read and calculate the pressure in kPa.
    ///
    /// Runs a full conversion cycle and discards the temperature half.
    pub fn get_pressure(&mut self) -> Result<f32, Error<E>> {
        let (pressure, _) = self.get_pressure_and_temperature()?;
        Ok(pressure)
    }

    /// Read and calculate the temperature in degrees celsius.
    ///
    /// Runs a full conversion cycle and discards the pressure half.
    pub fn get_temperature(&mut self) -> Result<f32, Error<E>> {
        let (_, temperature) = self.get_pressure_and_temperature()?;
        Ok(temperature)
    }

    /// Fetch the factory coefficient block.
    ///
    /// All eight bytes are read in one write-then-read transaction so the
    /// block cannot tear between accesses, and the four coefficients are
    /// stored together.
    fn read_coefficients(&mut self) -> Result<(), Error<E>> {
        let address = self.address;
        let mut raw = [0u8; 8];
        self.bus()?.write_read(address, &[A0_MSB], &mut raw)?;
        self.coefficients = Coefficients::from_raw(&raw);
        Ok(())
    }

    /// An empty addressed write; the device either acknowledges or the bus
    /// reports the NACK as an error.
    fn probe(&mut self) -> Result<(), Error<E>> {
        let address = self.address;
        self.bus()?.write(address, &[])?;
        Ok(())
    }

    fn bus(&mut self) -> Result<&mut I2C, Error<E>> {
        self.i2c.as_mut().ok_or(Error::NotInitialized)
    }
}
