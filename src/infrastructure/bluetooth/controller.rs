//! Beacon Controller Module
//!
//! Owns the transmit/fuzz state, the mutation counter and the session
//! address. Every radio call goes through here, from one logical thread.

use crate::domain::models::{
    AddressPolicy, BeaconEvent, BeaconState, BeaconStatus, DeviceAddress, FailureReason,
};
use crate::domain::settings::{BeaconSettings, SettingsError};
use crate::infrastructure::bluetooth::protocol::{
    apply_mutation, build_frame, mutation_bytes, Payload, BASE_PAYLOAD,
};
use crate::infrastructure::bluetooth::transport::{
    AdvertisingConfig, BeaconTransport, TransportError,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub struct BeaconController<T> {
    transport: T,
    settings: BeaconSettings,
    event_sender: mpsc::UnboundedSender<BeaconEvent>,
    state: BeaconState,
    counter: u16,
    last_mutation: Option<[u8; 4]>,
    session: Option<AdvertisingConfig>,
}

impl<T: BeaconTransport> BeaconController<T> {
    pub fn new(
        transport: T,
        mut settings: BeaconSettings,
        event_sender: mpsc::UnboundedSender<BeaconEvent>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;

        if transport.address_fixed_by_platform()
            && settings.address_policy != AddressPolicy::HostHardwareAddress
        {
            warn!("Radio cannot advertise from a chosen address, using the adapter address");
            settings.address_policy = AddressPolicy::HostHardwareAddress;
        }

        Ok(Self {
            transport,
            settings,
            event_sender,
            state: BeaconState::Idle,
            counter: 0,
            last_mutation: None,
            session: None,
        })
    }

    pub fn state(&self) -> BeaconState {
        self.state
    }

    pub fn tick_interval(&self) -> Duration {
        self.settings.tick_interval()
    }

    pub fn snapshot(&self) -> BeaconStatus {
        BeaconStatus {
            state: self.state,
            counter: self.counter,
            last_mutation: self.last_mutation,
            address: self.session.as_ref().map(|s| s.address),
        }
    }

    /// Begin a transmit session; ignored while one is already running
    pub async fn start(&mut self, fuzz: bool) {
        if self.state.is_active() {
            debug!("Start ignored, already {:?}", self.state);
            return;
        }

        let address = match self.session_address() {
            Ok(address) => address,
            Err(e) => {
                self.report_failure(&e);
                return;
            }
        };

        let config = AdvertisingConfig {
            address,
            min_interval_ms: self.settings.min_interval_ms,
            max_interval_ms: self.settings.max_interval_ms,
            channel_map: self.settings.channel_map,
            power_level: self.settings.power_level,
        };

        if let Err(e) = self.emit(&config, &BASE_PAYLOAD).await {
            self.report_failure(&e);
            return;
        }

        self.counter = 0;
        self.last_mutation = None;
        self.session = Some(config);
        self.state = if fuzz {
            BeaconState::TransmittingFuzzing
        } else {
            BeaconState::Transmitting
        };

        info!("Transmitting as {} (fuzz: {})", address, fuzz);
        self.send(BeaconEvent::TransmissionStarted { address, fuzz });
    }

    /// One scheduler period
    ///
    /// The counter advances before the radio is touched, so a failed fuzz
    /// tick still consumes its value.
    pub async fn tick(&mut self) {
        let Some(config) = self.session.clone() else {
            trace!("Tick while idle");
            return;
        };

        match self.state {
            BeaconState::Idle => {}
            BeaconState::Transmitting => {
                self.pulse(&config, &BASE_PAYLOAD, false).await;
            }
            BeaconState::TransmittingFuzzing => {
                if self.settings.announce_base_on_fuzz_tick {
                    self.pulse(&config, &BASE_PAYLOAD, false).await;
                }

                self.counter = self.counter.wrapping_add(1);
                let payload = apply_mutation(&BASE_PAYLOAD, self.counter);
                let mutated_bytes = mutation_bytes(self.counter);
                self.last_mutation = Some(mutated_bytes);
                self.send(BeaconEvent::FuzzTick {
                    counter: self.counter,
                    mutated_bytes,
                });

                self.pulse(&config, &payload, true).await;
            }
        }
    }

    /// End the session; returns false if there was none
    pub fn stop(&mut self) -> bool {
        if !self.state.is_active() {
            debug!("Stop ignored, already idle");
            return false;
        }

        self.transport.stop();
        self.state = BeaconState::Idle;
        self.session = None;

        info!("Transmission stopped after counter {}", self.counter);
        self.send(BeaconEvent::TransmissionStopped);
        true
    }

    /// Stop and hand the radio back
    pub fn shutdown(&mut self) {
        self.stop();
        self.transport.release();
        info!("Radio released");
    }

    fn session_address(&self) -> Result<DeviceAddress, TransportError> {
        match self.settings.address_policy {
            AddressPolicy::RandomizedVendorPrefix { oui } => {
                Ok(DeviceAddress::with_vendor_prefix(oui, &mut rand::thread_rng()))
            }
            AddressPolicy::HostHardwareAddress => self.transport.hardware_address(),
        }
    }

    async fn pulse(&mut self, config: &AdvertisingConfig, payload: &Payload, fuzzed: bool) {
        match self.emit(config, payload).await {
            Ok(()) => self.send(BeaconEvent::Pulse { fuzzed }),
            Err(e) => self.report_failure(&e),
        }
    }

    /// Push one frame and, in pulse mode, hold it for the broadcast window
    async fn emit(
        &mut self,
        config: &AdvertisingConfig,
        payload: &Payload,
    ) -> Result<(), TransportError> {
        let frame = build_frame(payload);
        trace!("Frame: {}", frame.to_hex());

        self.transport.stop();
        let result = self
            .transport
            .configure(config)
            .and_then(|_| self.transport.set_payload(&frame))
            .and_then(|_| self.transport.start());
        if let Err(e) = result {
            self.transport.stop();
            return Err(e);
        }

        if let Some(hold) = self.settings.broadcast_hold() {
            tokio::time::sleep(hold).await;
            self.transport.stop();
        }
        Ok(())
    }

    fn report_failure(&self, err: &TransportError) {
        warn!("Transmission failed in {:?}: {}", self.state, err);
        self.send(BeaconEvent::TransmissionFailed(FailureReason::from(err)));
    }

    fn send(&self, event: BeaconEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FailureStage, VENDOR_OUI};
    use crate::infrastructure::bluetooth::protocol::MUTATION_OFFSETS;
    use crate::infrastructure::bluetooth::transport::fake::{RadioCall, RecordingTransport};

    fn settings() -> BeaconSettings {
        BeaconSettings {
            broadcast_hold_ms: None,
            ..BeaconSettings::default()
        }
    }

    fn controller(
        settings: BeaconSettings,
    ) -> (
        BeaconController<RecordingTransport>,
        RecordingTransport,
        mpsc::UnboundedReceiver<BeaconEvent>,
    ) {
        let transport = RecordingTransport::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = BeaconController::new(transport.clone(), settings, tx).unwrap();
        (controller, transport, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<BeaconEvent>) -> Vec<BeaconEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_emits_base_frame() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(false).await;

        assert_eq!(c.state(), BeaconState::Transmitting);
        let frames = radio.log.lock().unwrap().emitted_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], build_frame(&BASE_PAYLOAD).as_bytes().to_vec());
        assert_eq!(&frames[0][..7], &[0x02, 0x01, 0x06, 0x1B, 0x16, 0x6C, 0xFE]);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            BeaconEvent::TransmissionStarted { address, fuzz } => {
                assert!(!fuzz);
                assert_eq!(address.vendor_prefix(), VENDOR_OUI);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_fuzz_tick() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(true).await;
        assert_eq!(c.state(), BeaconState::TransmittingFuzzing);
        c.tick().await;

        assert_eq!(c.snapshot().counter, 1);
        let events = drain(&mut rx);
        assert!(events.contains(&BeaconEvent::FuzzTick {
            counter: 1,
            mutated_bytes: [0x00, 0x01, 0x00, 0x10],
        }));
        assert!(events.contains(&BeaconEvent::Pulse { fuzzed: true }));

        let frames = radio.log.lock().unwrap().emitted_frames();
        let payload = &frames.last().unwrap()[7..];
        for (i, byte) in payload.iter().enumerate() {
            if !MUTATION_OFFSETS.contains(&i) {
                assert_eq!(*byte, BASE_PAYLOAD[i]);
            }
        }
        assert_eq!(
            [payload[10], payload[11], payload[20], payload[21]],
            [0x00, 0x01, 0x00, 0x10]
        );
    }

    #[tokio::test]
    async fn test_plain_tick_reannounces_base() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(false).await;
        c.tick().await;
        c.tick().await;

        assert_eq!(c.snapshot().counter, 0);
        let frames = radio.log.lock().unwrap().emitted_frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f == &frames[0]));

        let pulses = drain(&mut rx)
            .into_iter()
            .filter(|e| *e == BeaconEvent::Pulse { fuzzed: false })
            .count();
        assert_eq!(pulses, 2);
    }

    #[tokio::test]
    async fn test_base_announced_before_fuzz_frame() {
        let (mut c, radio, _rx) = controller(BeaconSettings {
            announce_base_on_fuzz_tick: true,
            ..settings()
        });
        c.start(true).await;
        c.tick().await;

        let frames = radio.log.lock().unwrap().emitted_frames();
        let base = build_frame(&BASE_PAYLOAD).as_bytes().to_vec();
        let fuzzed = build_frame(&apply_mutation(&BASE_PAYLOAD, 1))
            .as_bytes()
            .to_vec();
        assert_eq!(frames, vec![base.clone(), base, fuzzed]);
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let (mut c, _radio, mut rx) = controller(settings());
        c.start(true).await;
        c.start(false).await;

        assert_eq!(c.state(), BeaconState::TransmittingFuzzing);
        let started = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, BeaconEvent::TransmissionStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_double_stop_reports_once() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(false).await;
        assert!(c.stop());
        assert!(!c.stop());

        assert_eq!(c.state(), BeaconState::Idle);
        assert!(!radio.log.lock().unwrap().emitting);
        let stopped = drain(&mut rx)
            .into_iter()
            .filter(|e| *e == BeaconEvent::TransmissionStopped)
            .count();
        assert_eq!(stopped, 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_silent() {
        let (mut c, radio, mut rx) = controller(settings());
        assert!(!c.stop());
        assert!(drain(&mut rx).is_empty());
        assert!(radio.log.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_stop_returns_to_idle_from_both_modes() {
        for fuzz in [false, true] {
            let (mut c, _radio, _rx) = controller(settings());
            c.start(fuzz).await;
            c.tick().await;
            c.stop();
            assert_eq!(c.state(), BeaconState::Idle);
            assert_eq!(c.snapshot().address, None);
        }
    }

    #[tokio::test]
    async fn test_counter_wraps_after_full_cycle() {
        let (mut c, _radio, _rx) = controller(settings());
        c.start(true).await;
        for _ in 0..65_536u32 {
            c.tick().await;
        }

        assert_eq!(c.snapshot().counter, 0);
        assert_eq!(c.snapshot().last_mutation, Some(mutation_bytes(0)));
    }

    #[tokio::test]
    async fn test_restart_resets_counter_and_address() {
        let (mut c, radio, _rx) = controller(settings());
        c.start(true).await;
        c.tick().await;
        c.tick().await;
        let first = c.snapshot().address;
        assert_eq!(c.snapshot().counter, 2);

        c.stop();
        c.start(true).await;
        assert_eq!(c.snapshot().counter, 0);
        c.tick().await;
        assert_eq!(c.snapshot().counter, 1);

        // Every configure within a session used the same address
        let addresses = radio.log.lock().unwrap().configured_addresses();
        assert!(addresses[..3].iter().all(|a| Some(*a) == first));
    }

    #[tokio::test]
    async fn test_start_failure_stays_idle() {
        let (mut c, radio, mut rx) = controller(settings());
        radio.log.lock().unwrap().fail_configure = Some("interval".into());
        c.start(true).await;

        assert_eq!(c.state(), BeaconState::Idle);
        assert!(!radio.log.lock().unwrap().emitting);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            BeaconEvent::TransmissionFailed(reason) => {
                assert_eq!(reason.stage, FailureStage::Configuration)
            }
            other => panic!("unexpected event {:?}", other),
        }

        // No retry: the radio is left alone until the next start
        c.tick().await;
        assert_eq!(radio.log.lock().unwrap().emitted_frames().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_fuzz_tick_keeps_session() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(true).await;
        drain(&mut rx);

        radio.log.lock().unwrap().fail_start = Some("busy".into());
        c.tick().await;
        assert_eq!(c.state(), BeaconState::TransmittingFuzzing);
        assert_eq!(c.snapshot().counter, 1);
        let events = drain(&mut rx);
        assert!(matches!(events[0], BeaconEvent::FuzzTick { counter: 1, .. }));
        assert!(matches!(
            &events[1],
            BeaconEvent::TransmissionFailed(r) if r.stage == FailureStage::Start
        ));

        radio.log.lock().unwrap().fail_start = None;
        c.tick().await;
        assert_eq!(c.snapshot().counter, 2);
        assert!(drain(&mut rx).contains(&BeaconEvent::Pulse { fuzzed: true }));
    }

    #[tokio::test]
    async fn test_hardware_address_policy() {
        let hw: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let transport = RecordingTransport {
            hardware: Some(hw),
            ..RecordingTransport::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c = BeaconController::new(
            transport.clone(),
            BeaconSettings {
                address_policy: AddressPolicy::HostHardwareAddress,
                ..settings()
            },
            tx,
        )
        .unwrap();

        c.start(false).await;
        assert_eq!(c.snapshot().address, Some(hw));
        assert_eq!(transport.log.lock().unwrap().configured_addresses(), vec![hw]);
    }

    #[tokio::test]
    async fn test_fixed_address_radio_uses_hardware_address() {
        let hw: DeviceAddress = "10:20:30:40:50:60".parse().unwrap();
        let transport = RecordingTransport {
            hardware: Some(hw),
            fixed_address: true,
            ..RecordingTransport::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = BeaconController::new(transport.clone(), settings(), tx).unwrap();

        c.start(true).await;
        assert_eq!(c.state(), BeaconState::TransmittingFuzzing);
        assert_eq!(c.snapshot().address, Some(hw));
        assert_eq!(transport.log.lock().unwrap().configured_addresses(), vec![hw]);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [BeaconEvent::TransmissionStarted { address, fuzz: true }] if *address == hw
        ));
    }

    #[tokio::test]
    async fn test_payload_rejected_on_start() {
        let (mut c, radio, mut rx) = controller(settings());
        radio.log.lock().unwrap().fail_payload = Some("too long".into());
        c.start(false).await;

        assert_eq!(c.state(), BeaconState::Idle);
        assert!(!radio.log.lock().unwrap().emitting);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [BeaconEvent::TransmissionFailed(r)] if r.stage == FailureStage::Payload
        ));
    }

    #[tokio::test]
    async fn test_payload_rejected_on_fuzz_tick() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(true).await;
        drain(&mut rx);

        radio.log.lock().unwrap().fail_payload = Some("too long".into());
        c.tick().await;

        assert_eq!(c.state(), BeaconState::TransmittingFuzzing);
        assert_eq!(c.snapshot().counter, 1);
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [BeaconEvent::FuzzTick { counter: 1, .. }, BeaconEvent::TransmissionFailed(r)]
                if r.stage == FailureStage::Payload
        ));
    }

    #[tokio::test]
    async fn test_hardware_address_unavailable() {
        let (mut c, _radio, mut rx) = controller(BeaconSettings {
            address_policy: AddressPolicy::HostHardwareAddress,
            ..settings()
        });
        c.start(false).await;

        assert_eq!(c.state(), BeaconState::Idle);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [BeaconEvent::TransmissionFailed(_)]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_mode_turns_radio_off() {
        let (mut c, radio, _rx) = controller(BeaconSettings::default());
        let before = tokio::time::Instant::now();
        c.start(false).await;

        assert!(before.elapsed() >= Duration::from_millis(30));
        let log = radio.log.lock().unwrap();
        assert!(!log.emitting);
        assert_eq!(log.calls.last(), Some(&RadioCall::Stop));
    }

    #[tokio::test]
    async fn test_shutdown_releases_radio() {
        let (mut c, radio, mut rx) = controller(settings());
        c.start(false).await;
        c.shutdown();

        assert_eq!(c.state(), BeaconState::Idle);
        assert_eq!(
            radio.log.lock().unwrap().calls.last(),
            Some(&RadioCall::Release)
        );
        assert!(drain(&mut rx).contains(&BeaconEvent::TransmissionStopped));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = BeaconController::new(
            RecordingTransport::default(),
            BeaconSettings {
                min_interval_ms: 5,
                ..BeaconSettings::default()
            },
            tx,
        );
        assert!(result.is_err());
    }
}
