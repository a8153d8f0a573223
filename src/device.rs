use crate::config::{DebugLevel, DeviceConfig};
use crate::constants::MEMORY_SIZE;
use crate::cyclic::{CyclicConfig, CyclicMeasurement, CyclicState};
use crate::engine::Engine;
use crate::error::Error;
use crate::frame::{Command, DecodedReply};
use crate::opcode::Opcode;
use crate::session::{Session, Transport};
use crate::settings::{
    FirmwareVersion, KeyMask, MemoryMode, MemoryStatistics, Mode, ReplyValue, Unit, Variant, text_from_reply,
};
use crate::status::DeviceStatus;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::debug;

/// An Alluris force gauge or test stand behind an open transport.
///
/// Every method is one bounded exchange (or a bounded sequence of them) and
/// takes `&mut self`; share a `Device` across threads only behind a mutex.
/// While a cyclic measurement is running, samples that arrive between
/// requests are moved into the cyclic buffer instead of being mistaken for
/// replies.
pub struct Device<T> {
    engine: Engine<T>,
    cyclic: CyclicMeasurement,
    config: DeviceConfig,
    f_max: Option<i32>,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DeviceConfig::default())
    }

    pub fn with_config(transport: T, config: DeviceConfig) -> Self {
        let session = Session::new(transport, config.session.clone());
        Self {
            engine: Engine::new(session),
            cyclic: CyclicMeasurement::new(),
            config,
            f_max: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn engine_mut(&mut self) -> &mut Engine<T> {
        &mut self.engine
    }

    pub fn transport(&self) -> &T {
        self.engine.session().transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.session_mut().transport_mut()
    }

    /// Give the transport back to the caller; the device is not closed.
    pub fn into_transport(self) -> T {
        self.engine.into_session().into_transport()
    }

    /// Discard stale bytes on the IN endpoint. Returns the number discarded.
    pub fn flush(&mut self) -> usize {
        self.engine.flush()
    }

    // ---------------------------------------------------------------------
    // Typed request helpers
    // ---------------------------------------------------------------------

    fn exchange(&mut self, command: Command, recv_timeout: Option<Duration>) -> Result<DecodedReply, Error> {
        let send_timeout = self.config.session.send_timeout;
        let recv_timeout = recv_timeout.unwrap_or(self.config.session.receive_timeout);
        if self.cyclic.is_streaming() {
            let cyclic = &mut self.cyclic;
            self.engine
                .call_draining(command, send_timeout, recv_timeout, &mut |raw: &[u8]| cyclic.ingest(raw))
        } else {
            self.engine.call(command, send_timeout, recv_timeout)
        }
    }

    fn query<V: ReplyValue>(&mut self, opcode: Opcode) -> Result<V, Error> {
        let reply = self.exchange(Command::new(opcode), None)?;
        V::from_reply(opcode, reply.value)
    }

    fn query_with<V: ReplyValue>(&mut self, opcode: Opcode, param: i64) -> Result<V, Error> {
        check_width(opcode, param)?;
        let reply = self.exchange(Command::with_param(opcode, param), None)?;
        V::from_reply(opcode, reply.value)
    }

    fn query_text(&mut self, opcode: Opcode) -> Result<String, Error> {
        let reply = self.exchange(Command::new(opcode), None)?;
        text_from_reply(opcode, &reply.payload)
    }

    fn command(&mut self, opcode: Opcode) -> Result<(), Error> {
        self.exchange(Command::new(opcode), None).map(drop)
    }

    fn command_with(&mut self, opcode: Opcode, param: i64) -> Result<(), Error> {
        check_width(opcode, param)?;
        self.exchange(Command::with_param(opcode, param), None).map(drop)
    }

    // ---------------------------------------------------------------------
    // Measurement
    // ---------------------------------------------------------------------

    /// Current force in instrument digits
    pub fn value(&mut self) -> Result<i32, Error> {
        self.query(Opcode::GetValue)
    }

    pub fn pos_peak(&mut self) -> Result<i32, Error> {
        self.query(Opcode::GetPosPeak)
    }

    pub fn neg_peak(&mut self) -> Result<i32, Error> {
        self.query(Opcode::GetNegPeak)
    }

    pub fn tare(&mut self) -> Result<(), Error> {
        self.command(Opcode::Tare)
    }

    pub fn clear_pos_peak(&mut self) -> Result<(), Error> {
        self.command(Opcode::ClearPosPeak)
    }

    pub fn clear_neg_peak(&mut self) -> Result<(), Error> {
        self.command(Opcode::ClearNegPeak)
    }

    /// Start a measurement and wait until the status word reports it running.
    pub fn start_measurement(&mut self) -> Result<(), Error> {
        self.command(Opcode::StartMeasurement)?;
        self.wait_for_measuring(true)
    }

    /// Stop the measurement and wait until the status word reports it stopped.
    pub fn stop_measurement(&mut self) -> Result<(), Error> {
        self.command(Opcode::StopMeasurement)?;
        self.wait_for_measuring(false)
    }

    fn wait_for_measuring(&mut self, expected: bool) -> Result<(), Error> {
        let started = Instant::now();
        let deadline = started + self.config.state_change_timeout;
        let mut remaining = self.config.state_change_timeout;
        loop {
            let limit = remaining.min(self.config.session.receive_timeout);
            if self.read_state(Some(limit))?.measuring == expected {
                if self.config.session.debug_level >= DebugLevel::Calls {
                    debug!(
                        measuring = expected,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Measurement state changed"
                    );
                }
                return Ok(());
            }
            remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            std::thread::sleep(self.config.state_poll_interval.min(remaining));
        }
    }

    /// Read and decode the status word. `timeout` overrides the default
    /// receive timeout for this one exchange.
    pub fn read_state(&mut self, timeout: Option<Duration>) -> Result<DeviceStatus, Error> {
        let reply = self.exchange(Command::new(Opcode::GetStatus), timeout)?;
        let word = u32::from_reply(Opcode::GetStatus, reply.value)?;
        Ok(DeviceStatus::decode(word))
    }

    // ---------------------------------------------------------------------
    // Limits
    // ---------------------------------------------------------------------

    pub fn set_upper_limit(&mut self, limit: i32) -> Result<(), Error> {
        self.command_with(Opcode::SetUpperLimit, limit.into())
    }

    pub fn set_lower_limit(&mut self, limit: i32) -> Result<(), Error> {
        self.command_with(Opcode::SetLowerLimit, limit.into())
    }

    pub fn upper_limit(&mut self) -> Result<i32, Error> {
        self.query(Opcode::GetUpperLimit)
    }

    pub fn lower_limit(&mut self) -> Result<i32, Error> {
        self.query(Opcode::GetLowerLimit)
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error> {
        self.command_with(Opcode::SetMode, u8::from(mode).into())
    }

    pub fn mode(&mut self) -> Result<Mode, Error> {
        self.query(Opcode::GetMode)
    }

    pub fn set_mem_mode(&mut self, mode: MemoryMode) -> Result<(), Error> {
        self.command_with(Opcode::SetMemMode, u8::from(mode).into())
    }

    pub fn mem_mode(&mut self) -> Result<MemoryMode, Error> {
        self.query(Opcode::GetMemMode)
    }

    /// Change the display unit. Units that do not exist for this gauge's
    /// nominal range are rejected before anything is sent.
    pub fn set_unit(&mut self, unit: Unit) -> Result<(), Error> {
        let f_max = self.f_max()?;
        if !unit.is_supported_for_range(f_max) {
            return Err(Error::OutOfRange(format!("unit {unit} not available on a {f_max} N device")));
        }
        self.command_with(Opcode::SetUnit, u8::from(unit).into())
    }

    pub fn unit(&mut self) -> Result<Unit, Error> {
        self.query(Opcode::GetUnit)
    }

    /// Set the three digital outputs, bit mask 0..=7.
    pub fn set_digout(&mut self, mask: u8) -> Result<(), Error> {
        check_domain("digital output mask", mask.into(), 0..=7)?;
        self.command_with(Opcode::SetDigout, mask.into())
    }

    pub fn digout(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetDigout)
    }

    pub fn digin(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetDigin)
    }

    /// Peak detection trigger level, 1..=9
    pub fn set_peak_level(&mut self, level: u8) -> Result<(), Error> {
        check_domain("peak level", level.into(), 1..=9)?;
        self.command_with(Opcode::SetPeakLevel, level.into())
    }

    pub fn peak_level(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetPeakLevel)
    }

    /// Automatic stop after `seconds` (0 disables), 0..=99
    pub fn set_autostop(&mut self, seconds: u8) -> Result<(), Error> {
        check_domain("autostop", seconds.into(), 0..=99)?;
        self.command_with(Opcode::SetAutostop, seconds.into())
    }

    pub fn autostop(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetAutostop)
    }

    pub fn set_key_lock(&mut self, active: bool) -> Result<(), Error> {
        self.command_with(Opcode::SetKeyLock, active.into())
    }

    /// Decimation of the streamed data, 1..=255
    pub fn set_data_ratio(&mut self, ratio: u8) -> Result<(), Error> {
        check_domain("data ratio", ratio.into(), 1..=255)?;
        self.command_with(Opcode::SetDataRatio, ratio.into())
    }

    // ---------------------------------------------------------------------
    // Device information
    // ---------------------------------------------------------------------

    pub fn digits(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetDigits)
    }

    pub fn resolution(&mut self) -> Result<u8, Error> {
        self.query(Opcode::GetResolution)
    }

    /// Nominal range in N. Read once, then cached.
    pub fn f_max(&mut self) -> Result<i32, Error> {
        if let Some(f_max) = self.f_max {
            return Ok(f_max);
        }
        let f_max: i32 = self.query(Opcode::GetFMax)?;
        self.f_max = Some(f_max);
        Ok(f_max)
    }

    pub fn variant(&mut self) -> Result<Variant, Error> {
        self.query(Opcode::GetVariant)
    }

    /// Firmware of the gauge (`part` 0) or of the measurement board (1).
    pub fn firmware(&mut self, part: u8) -> Result<FirmwareVersion, Error> {
        check_domain("firmware part", part.into(), 0..=1)?;
        self.query_with(Opcode::GetFirmware, part.into())
    }

    pub fn next_calibration_date(&mut self) -> Result<u32, Error> {
        self.query(Opcode::GetNextCalibrationDate)
    }

    pub fn calibration_date(&mut self) -> Result<u16, Error> {
        self.query(Opcode::GetCalibrationDate)
    }

    pub fn read_flash(&mut self, address: u16) -> Result<u16, Error> {
        self.query_with(Opcode::ReadFlash, address.into())
    }

    /// Serial number printed on the instrument, e.g. "P.25412"
    pub fn serial_number(&mut self) -> Result<String, Error> {
        self.query_text(Opcode::GetSerialNumber)
    }

    /// Number of the last calibration certificate
    pub fn calibration_number(&mut self) -> Result<String, Error> {
        self.query_text(Opcode::GetCalibrationNumber)
    }

    /// Measurement uncertainty of the last calibration
    pub fn uncertainty(&mut self) -> Result<f64, Error> {
        let raw: u16 = self.query(Opcode::GetUncertainty)?;
        Ok(f64::from(raw) / 1000.0)
    }

    // ---------------------------------------------------------------------
    // Memory
    // ---------------------------------------------------------------------

    pub fn read_memory(&mut self, address: u16) -> Result<i32, Error> {
        if address >= MEMORY_SIZE {
            return Err(Error::OutOfRange(format!(
                "memory address {address} outside 0..{MEMORY_SIZE}"
            )));
        }
        self.query_with(Opcode::ReadMemory, address.into())
    }

    pub fn delete_memory(&mut self) -> Result<(), Error> {
        self.command(Opcode::DeleteMemory)
    }

    pub fn mem_count(&mut self) -> Result<u16, Error> {
        self.query(Opcode::GetMemCount)
    }

    pub fn mem_statistics(&mut self) -> Result<MemoryStatistics, Error> {
        let mut values = [0i32; MemoryStatistics::FIELDS];
        for (index, slot) in values.iter_mut().enumerate() {
            *slot = self.query_with(Opcode::GetMemStatistic, index as i64)?;
        }
        Ok(MemoryStatistics::from_values(values))
    }

    // ---------------------------------------------------------------------
    // Keys, motor and maintenance
    // ---------------------------------------------------------------------

    pub fn sim_keypress(&mut self, keys: KeyMask) -> Result<(), Error> {
        if !keys.is_valid() {
            return Err(Error::OutOfRange(format!("invalid key mask {:#04x}", keys.bits())));
        }
        self.command_with(Opcode::SimKeypress, keys.bits().into())
    }

    pub fn start_motor_reference_run(&mut self, start: bool) -> Result<(), Error> {
        self.command_with(Opcode::MotorReferenceRun, start.into())
    }

    pub fn set_motor_disable(&mut self, disable: bool) -> Result<(), Error> {
        self.command_with(Opcode::SetMotorDisable, disable.into())
    }

    pub fn motor_enable(&mut self) -> Result<bool, Error> {
        self.query(Opcode::GetMotorEnable)
    }

    pub fn set_buzzer_motor(&mut self, on: bool) -> Result<(), Error> {
        self.command_with(Opcode::SetBuzzerMotor, on.into())
    }

    pub fn buzzer_motor(&mut self) -> Result<bool, Error> {
        self.query(Opcode::GetBuzzerMotor)
    }

    pub fn set_motor_start(&mut self, start: bool) -> Result<(), Error> {
        self.command_with(Opcode::SetMotorStart, start.into())
    }

    pub fn set_motor_stop(&mut self, stop: bool) -> Result<(), Error> {
        self.command_with(Opcode::SetMotorStop, stop.into())
    }

    pub fn restore_factory_defaults(&mut self) -> Result<(), Error> {
        self.f_max = None;
        self.command(Opcode::RestoreFactoryDefaults)
    }

    pub fn power_off(&mut self) -> Result<(), Error> {
        self.command(Opcode::PowerOff)
    }

    // ---------------------------------------------------------------------
    // Cyclic measurement
    // ---------------------------------------------------------------------

    pub fn start_cyclic(&mut self, config: CyclicConfig) -> Result<(), Error> {
        self.cyclic.start(&mut self.engine, config)
    }

    pub fn stop_cyclic(&mut self) -> Result<(), Error> {
        self.cyclic.stop(&mut self.engine)
    }

    /// Wait for exactly `n` streamed samples, oldest first.
    pub fn poll_measurement(&mut self, n: usize, timeout: Duration) -> Result<Vec<i32>, Error> {
        self.cyclic.poll_blocking(&mut self.engine, n, timeout)
    }

    /// Up to `max_n` streamed samples that are ready now, possibly none.
    pub fn poll_measurement_no_wait(&mut self, max_n: usize) -> Result<Vec<i32>, Error> {
        self.cyclic.poll_nonblocking(&mut self.engine, max_n)
    }

    pub fn is_streaming(&self) -> bool {
        self.cyclic.is_streaming()
    }

    pub fn cyclic_state(&self) -> CyclicState {
        self.cyclic.state()
    }

    /// Samples lost to buffer overflow during the current cyclic run
    pub fn dropped_samples(&self) -> u64 {
        self.cyclic.dropped()
    }
}

fn check_width(opcode: Opcode, param: i64) -> Result<(), Error> {
    let width = opcode.param_width();
    if width.is_empty() || !width.contains(param) {
        return Err(Error::OutOfRange(format!(
            "parameter {param} does not fit {opcode} ({:?})",
            width
        )));
    }
    Ok(())
}

fn check_domain(what: &str, value: i64, domain: RangeInclusive<i64>) -> Result<(), Error> {
    if !domain.contains(&value) {
        return Err(Error::OutOfRange(format!(
            "{what} {value} outside {}..={}",
            domain.start(),
            domain.end()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use bytes::Bytes;

    /// Accepts every write and never answers.
    #[derive(Default)]
    struct Silent {
        writes: usize,
    }

    impl Transport for Silent {
        fn send(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
            self.writes += 1;
            Ok(data.len())
        }

        fn receive(&mut self, _endpoint: u8, _max_len: usize, _timeout: Duration) -> Result<Bytes, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    #[test]
    fn test_limit_outside_int24_is_rejected_before_sending() {
        let mut device = Device::new(Silent::default());
        let err = device.set_upper_limit(1 << 23).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(device.transport().writes, 0);
    }

    #[test]
    fn test_domain_checks() {
        let mut device = Device::new(Silent::default());
        for err in [
            device.set_digout(8).unwrap_err(),
            device.set_peak_level(0).unwrap_err(),
            device.set_peak_level(10).unwrap_err(),
            device.set_autostop(100).unwrap_err(),
            device.set_data_ratio(0).unwrap_err(),
            device.read_memory(MEMORY_SIZE).unwrap_err(),
            device.firmware(2).unwrap_err(),
            device.sim_keypress(KeyMask::default()).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::OutOfRange, "{err}");
        }
        assert_eq!(device.transport().writes, 0);
    }

    #[test]
    fn test_silence_is_a_timeout() {
        let mut config = DeviceConfig::default();
        config.session.receive_timeout = Duration::from_millis(1);
        let mut device = Device::with_config(Silent::default(), config);
        assert!(matches!(device.tare(), Err(Error::Timeout)));
        assert_eq!(device.transport().writes, 1);
    }

    #[test]
    fn test_width_check() {
        assert!(check_width(Opcode::ReadFlash, 65_535).is_ok());
        assert!(check_width(Opcode::ReadFlash, 65_536).is_err());
        assert!(check_width(Opcode::SetLowerLimit, -8_388_608).is_ok());
        assert!(check_width(Opcode::Tare, 0).is_err());
    }
}
