//! MAX1720x, MAX17205 fuel gauge driver.
//!
//! Reads the ModelGauge m5 result registers over I2C and converts them to
//! engineering units. All registers are 16 bit, little endian.
//!
//! - Address(7bit): 0x36
//! - Voltage: mV
//! - Current: mA, positive when charging
//! - State of charge: %
//! - Capacity: mAh

use embedded_hal_1::i2c::{self, ErrorKind, I2c};

const MAX1720X_I2CADDR: u8 = 0x36;

const MAX1720X_STATUS_ADDR: u8 = 0x00; // Alert status and chip status
const MAX1720X_REPCAP_ADDR: u8 = 0x05; // Reported remaining capacity
const MAX1720X_REPSOC_ADDR: u8 = 0x06; // Reported state of charge
const MAX1720X_TEMP_ADDR: u8 = 0x08; // Temperature
const MAX1720X_VCELL_ADDR: u8 = 0x09; // Lowest cell voltage of the pack
const MAX1720X_CURRENT_ADDR: u8 = 0x0A; // Battery current
const MAX1720X_FULLCAP_ADDR: u8 = 0x10; // Full capacity estimation
const MAX1720X_TTE_ADDR: u8 = 0x11; // Time to empty
const MAX1720X_TTF_ADDR: u8 = 0x20; // Time to full
const MAX1720X_CFGPACK_ADDR: u8 = 0xB5; // nPackCfg, low byte only
const MAX1720X_VBAT_ADDR: u8 = 0xDA; // Battery pack voltage

const MAX1720X_SOC_DIVISOR: f32 = 256.0;
// Assumes the fixed sense resistor of the reference design.
const MAX1720X_CAPACITY_DIVISOR: f32 = 256.0;
const MAX1720X_CURRENT_LSB_MV: f32 = 0.001_562_5;
const MAX1720X_RSENSE_OHM: f32 = 0.01;
const MAX1720X_VBAT_LSB_MV: f32 = 1.25;
const MAX1720X_VCELL_LSB_MV: f32 = 0.078_125;
const MAX1720X_TEMP_DIVISOR: f32 = 256.0;
const MAX1720X_TIME_LSB_S: f32 = 5.625;

macro_rules! concat_bytes {
    ($msb:expr, $lsb:expr) => {
        (($msb as u16) << 8) | ($lsb as u16)
    };
}

/// Combine a little endian register readback into an unsigned word.
#[inline]
pub fn decode_unsigned(bytes: [u8; 2]) -> u16 {
    concat_bytes!(bytes[1], bytes[0])
}

/// Combine a little endian register readback into a two's complement word.
#[inline]
pub fn decode_signed(bytes: [u8; 2]) -> i16 {
    let value = decode_unsigned(bytes) as i32;
    let value = if value >= 0x8000 { value - 0x10000 } else { value };
    value as i16
}

/// MAX1720x errors
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// I²C transaction failed: no acknowledge, arbitration loss or bus error
    I2c(E),
}

impl<E: i2c::Error> Error<E> {
    /// Classify the underlying bus failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::I2c(e) => e.kind(),
        }
    }
}

/// Flags of the Status register
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Power-on reset
    pub por: bool,
    /// Minimum current alert threshold exceeded
    pub imn: bool,
    /// Battery status, set when no battery is present
    pub bst: bool,
    /// Maximum current alert threshold exceeded
    pub imx: bool,
    /// State of charge changed by 1%
    pub dsoci: bool,
    /// Minimum voltage alert threshold exceeded
    pub vmn: bool,
    /// Minimum temperature alert threshold exceeded
    pub tmn: bool,
    /// Minimum SoC alert threshold exceeded
    pub smn: bool,
    /// Battery insertion
    pub bi: bool,
    /// Maximum voltage alert threshold exceeded
    pub vmx: bool,
    /// Maximum temperature alert threshold exceeded
    pub tmx: bool,
    /// Maximum SoC alert threshold exceeded
    pub smx: bool,
    /// Battery removal
    pub br: bool,
}

impl Status {
    pub fn from_raw(raw: u16) -> Self {
        let bit = |n: u16| raw & (1 << n) != 0;
        Status {
            por: bit(1),
            imn: bit(2),
            bst: bit(3),
            imx: bit(6),
            dsoci: bit(7),
            vmn: bit(8),
            tmn: bit(9),
            smn: bit(10),
            bi: bit(11),
            vmx: bit(12),
            tmx: bit(13),
            smx: bit(14),
            br: bit(15),
        }
    }
}

/// Measurement data
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    /// pack voltage in mV
    pub voltage: f32,
    /// pack current in mA
    pub current: f32,
    /// state of charge in percent
    pub soc: f32,
    /// remaining capacity in mAh
    pub capacity: f32,
    /// lowest cell voltage in mV
    pub midvoltage: f32,
}

/// Representation of a MAX1720x
///
/// Every read stores its converted value in the driver before returning it,
/// so the last good reading of each quantity is available without touching
/// the bus. A failed read leaves the stored value untouched.
pub struct MAX1720x<I2C> {
    i2c: I2C,
    tx_buffer: [u8; 2],
    rx_buffer: [u8; 2],
    voltage: f32,
    current: f32,
    midvoltage: f32,
    soc: f32,
    capacity: f32,
}

impl<I2C> MAX1720x<I2C>
where
    I2C: I2c,
{
    /// Create device driver instance. The bus is not touched until the first read.
    pub fn new(i2c: I2C) -> Self {
        MAX1720x {
            i2c,
            tx_buffer: [0u8; 2],
            rx_buffer: [0u8; 2],
            voltage: 0.0,
            current: 0.0,
            midvoltage: 0.0,
            soc: 0.0,
            capacity: 0.0,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn address(&self) -> u8 {
        MAX1720X_I2CADDR
    }

    /// Reads the pack configuration register.
    ///
    /// Pack configuration is not implemented: the readback is never
    /// interpreted and the result is `Ok(true)` whenever the bus transaction
    /// itself succeeds.
    pub fn config_pack(&mut self) -> Result<bool, Error<I2C::Error>> {
        let _raw = self.read_register(MAX1720X_CFGPACK_ADDR)?;

        #[cfg(feature = "defmt")]
        defmt::debug!("max1720x: nPackCfg readback {:x}", _raw);

        Ok(true)
    }

    /// Reported state of charge, in percent.
    pub fn read_soc(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_REPSOC_ADDR)?);
        self.soc = raw as f32 / MAX1720X_SOC_DIVISOR;
        Ok(self.soc)
    }

    /// Reported remaining capacity, in mAh.
    pub fn read_capacity(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_REPCAP_ADDR)?);
        self.capacity = raw as f32 / MAX1720X_CAPACITY_DIVISOR;
        Ok(self.capacity)
    }

    /// Instantaneous pack current, in mA. Negative while discharging.
    pub fn read_current(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_signed(self.read_register(MAX1720X_CURRENT_ADDR)?);
        self.current = raw as f32 * MAX1720X_CURRENT_LSB_MV / MAX1720X_RSENSE_OHM;
        Ok(self.current)
    }

    /// Pack voltage, in mV.
    pub fn read_voltage(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_VBAT_ADDR)?);
        self.voltage = raw as f32 * MAX1720X_VBAT_LSB_MV;
        Ok(self.voltage)
    }

    /// Midpoint (lowest cell) voltage, in mV.
    pub fn read_midvoltage(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_VCELL_ADDR)?);
        self.midvoltage = raw as f32 * MAX1720X_VCELL_LSB_MV;
        Ok(self.midvoltage)
    }

    /// Reads voltage, current, SoC, capacity and midpoint voltage, in that order.
    ///
    /// Stops at the first failing read; values read before it stay cached.
    pub fn measure(&mut self) -> Result<Measurements, Error<I2C::Error>> {
        Ok(Measurements {
            voltage: self.read_voltage()?,
            current: self.read_current()?,
            soc: self.read_soc()?,
            capacity: self.read_capacity()?,
            midvoltage: self.read_midvoltage()?,
        })
    }

    pub fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_STATUS_ADDR)?);
        Ok(Status::from_raw(raw))
    }

    /// Die temperature, in degrees celsius.
    pub fn read_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_signed(self.read_register(MAX1720X_TEMP_ADDR)?);
        Ok(raw as f32 / MAX1720X_TEMP_DIVISOR)
    }

    /// Estimated time to empty, in seconds.
    pub fn read_time_to_empty(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_TTE_ADDR)?);
        Ok(raw as f32 * MAX1720X_TIME_LSB_S)
    }

    /// Estimated time to full, in seconds.
    pub fn read_time_to_full(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_TTF_ADDR)?);
        Ok(raw as f32 * MAX1720X_TIME_LSB_S)
    }

    /// Full capacity estimation, in mAh. Same scaling as `read_capacity`.
    pub fn read_full_capacity(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = decode_unsigned(self.read_register(MAX1720X_FULLCAP_ADDR)?);
        Ok(raw as f32 / MAX1720X_CAPACITY_DIVISOR)
    }

    /// Last pack voltage read, in mV.
    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn midvoltage(&self) -> f32 {
        self.midvoltage
    }

    pub fn soc(&self) -> f32 {
        self.soc
    }

    pub fn capacity(&self) -> f32 {
        self.capacity
    }

    // One write_read is one bus transaction: register address, repeated start, 2 bytes.
    fn read_register(&mut self, register: u8) -> Result<[u8; 2], Error<I2C::Error>> {
        self.tx_buffer[0] = register;
        match self
            .i2c
            .write_read(MAX1720X_I2CADDR, &self.tx_buffer[..1], &mut self.rx_buffer)
        {
            Ok(()) => {
                #[cfg(feature = "defmt")]
                defmt::trace!("max1720x: reg {:02x} => {:x}", register, self.rx_buffer);

                Ok(self.rx_buffer)
            }
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("max1720x: read of reg {:02x} failed", register);

                Err(Error::I2c(e))
            }
        }
    }
}
