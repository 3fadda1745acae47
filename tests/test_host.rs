use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blehost::ad_structure::{ServiceDataEntry, Uuid};
use blehost::command::CommandPacket;
use blehost::types::{AddrType, BdAddr, CentralClockAccuracy, Role};
use blehost::{
    event_filter, AclReassemblyBuffer, AdapterState, ControllerError, ErrorKind, Gap, GapError,
    GapEvent, Hci, HciEvent, Transport,
};

#[derive(Default)]
struct MockState {
    written: Vec<Vec<u8>>,
    filters: Vec<Vec<u8>>,
    dev_up: bool,
    fail_writes_with: Option<ErrorKind>,
}

#[derive(Clone, Default)]
struct MockTransport(Rc<RefCell<MockState>>);

impl MockTransport {
    fn new() -> Self {
        Self::default()
    }

    fn set_dev_up(&self, up: bool) {
        self.0.borrow_mut().dev_up = up;
    }

    fn fail_writes_with(&self, kind: ErrorKind) {
        self.0.borrow_mut().fail_writes_with = Some(kind);
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.0.borrow().written.clone()
    }

    fn filters(&self) -> Vec<Vec<u8>> {
        self.0.borrow().filters.clone()
    }

    fn clear_written(&self) {
        self.0.borrow_mut().written.clear();
    }
}

#[derive(Debug)]
struct MockError(ErrorKind);

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

impl embedded_io::ErrorType for MockTransport {
    type Error = MockError;
}

impl embedded_io::Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.0.borrow_mut();
        if let Some(kind) = state.fail_writes_with {
            return Err(MockError(kind));
        }
        state.written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_filter(&mut self, filter: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().filters.push(filter.to_vec());
        Ok(())
    }

    fn is_dev_up(&mut self) -> bool {
        self.0.borrow().dev_up
    }

    fn local_address(&mut self) -> BdAddr {
        BdAddr::new([0x66, 0x55, 0x44, 0x33, 0x22, 0x11])
    }
}

fn millis_zero() -> u64 {
    0
}

fn host() -> (MockTransport, Hci<MockTransport, fn() -> u64>) {
    let mock = MockTransport::new();
    let hci = Hci::new(mock.clone(), millis_zero as fn() -> u64);
    (mock, hci)
}

fn drain<T: Transport, F: Fn() -> u64>(hci: &mut Hci<T, F>) -> Vec<HciEvent> {
    std::iter::from_fn(|| hci.poll_event()).collect()
}

fn drain_gap(gap: &mut Gap) -> Vec<GapEvent> {
    std::iter::from_fn(|| gap.poll_event()).collect()
}

fn pump<T: Transport, F: Fn() -> u64>(hci: &mut Hci<T, F>, gap: &mut Gap) {
    while let Some(event) = hci.poll_event() {
        gap.on_hci_event(&event);
    }
}

fn opcode_of(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[1], frame[2]])
}

#[test]
fn event_filter_layout() {
    assert_eq!(
        event_filter(),
        [
            0x14, 0x00, 0x00, 0x00, // packet types: event + acl data
            0x20, 0xc1, 0x00, 0x00, // disconn, encrypt change, cmd complete, cmd status
            0x00, 0x00, 0x00, 0x40, // le meta
            0x00, 0x00, // opcode: all
        ]
    );
}

#[test]
fn init_bootstraps_when_device_up() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mock, mut hci) = host();
    mock.set_dev_up(true);

    hci.init();

    assert_eq!(mock.filters(), vec![event_filter().to_vec()]);
    let written = mock.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], vec![0x01, 0x0a, 0x20, 0x01, 0x00]);
    assert_eq!(
        written[1],
        vec![
            0x01, 0x06, 0x20, 0x0f, // header
            0xa0, 0x00, 0xa0, 0x00, // interval min/max
            0x00, 0x00, 0x00, // adv type, own addr type, peer addr type
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // peer addr
            0x07, 0x00, // channel map, filter policy
        ]
    );
    // readiness is signalled by the command completion, not the probe
    assert_eq!(drain(&mut hci), vec![]);
    assert_eq!(hci.address(), BdAddr::new([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]));
    assert_eq!(hci.address_type(), AddrType::Public);
}

#[test]
fn init_reports_powered_off_when_device_down() {
    let (mock, mut hci) = host();
    mock.set_dev_up(false);

    hci.init();

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::StateChange(AdapterState::PoweredOff)]
    );
    assert!(mock.written().is_empty());
}

#[test]
fn tick_is_rate_limited() {
    let mock = MockTransport::new();
    let clock = Rc::new(Cell::new(0u64));
    let tick_clock = clock.clone();
    let mut hci = Hci::new(mock.clone(), move || tick_clock.get());

    hci.init();
    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::StateChange(AdapterState::PoweredOff)]
    );

    mock.set_dev_up(true);

    clock.set(500);
    hci.tick();
    assert!(mock.filters().is_empty());
    assert!(mock.written().is_empty());

    clock.set(1000);
    hci.tick();
    assert_eq!(mock.filters().len(), 1);
    assert_eq!(mock.written().len(), 2);
}

#[test]
fn advertising_parameters_complete_signals_powered_on() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x06, 0x20, 0x00]);

    assert_eq!(
        drain(&mut hci),
        vec![
            HciEvent::StateChange(AdapterState::PoweredOn),
            HciEvent::LeAdvertisingParametersSet { status: 0 },
        ]
    );
}

#[test]
fn command_complete_routes_by_opcode() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x08, 0x20, 0x00]);
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x09, 0x20, 0x0c]);
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x00]);

    assert_eq!(
        drain(&mut hci),
        vec![
            HciEvent::LeAdvertisingDataSet { status: 0 },
            HciEvent::LeScanResponseDataSet { status: 0x0c },
            HciEvent::LeAdvertiseEnableSet { status: 0 },
        ]
    );
}

#[test]
fn read_rssi_complete_parses_handle_and_rssi() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x0e, 0x07, 0x01, 0x05, 0x14, 0x00, 0xaa, 0x00, 0xd0]);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::RssiRead {
            handle: 0x00aa,
            rssi: -48,
        }]
    );
}

#[test]
fn disconnection_complete_event() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x05, 0x04, 0x00, 0x01, 0x00, 0x13]);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::DisconnectionComplete {
            handle: 0x0001,
            reason: 0x13,
        }]
    );
}

#[test]
fn encryption_change_event() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x08, 0x04, 0x00, 0x01, 0x00, 0x01]);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::EncryptionChange {
            handle: 0x0001,
            encrypted: true,
        }]
    );
}

#[test]
fn le_connection_complete_event() {
    let (_mock, mut hci) = host();

    hci.on_data(&[
        0x04, 0x3e, 0x13, // event packet, le meta
        0x01, // connection complete
        0x00, // status
        0x01, 0x00, // handle
        0x01, // role
        0x01, // peer address type
        0x4b, 0x7d, 0x99, 0x9c, 0x6f, 0x45, // peer address
        0x18, 0x00, // interval
        0x00, 0x00, // latency
        0xf4, 0x01, // supervision timeout
        0x05, // central clock accuracy
    ]);

    let peer_address = BdAddr::new([0x4b, 0x7d, 0x99, 0x9c, 0x6f, 0x45]);
    assert_eq!(peer_address.to_colon_hex().as_str(), "45:6f:9c:99:7d:4b");
    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::LeConnectionComplete {
            status: 0,
            handle: 0x0001,
            role: Role::Peripheral,
            peer_address_type: AddrType::Random,
            peer_address,
            connection_interval: 0x0018 * 1250,
            peripheral_latency: 0,
            supervision_timeout: 0x01f4 * 10,
            central_clock_accuracy: CentralClockAccuracy::PPM50,
        }]
    );
}

#[test]
fn le_connection_update_complete_event() {
    let (_mock, mut hci) = host();

    hci.on_data(&[
        0x04, 0x3e, 0x0a, 0x03, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00, 0x00, 0xf4, 0x01,
    ]);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::LeConnectionUpdateComplete {
            status: 0,
            handle: 0x0001,
            connection_interval: 0x0006 * 1250,
            peripheral_latency: 0,
            supervision_timeout: 0x01f4 * 10,
        }]
    );
}

#[test]
fn acl_start_fragment_with_full_payload_publishes_immediately() {
    let (_mock, mut hci) = host();

    hci.on_data(&[
        0x02, // acl data packet
        0x01, 0x20, // handle 1, start fragment
        0x0e, 0x00, // acl payload length
        0x0a, 0x00, // l2cap length
        0x40, 0x00, // channel id
        0, 1, 2, 3, 4, 5, 6, 7, 8, 9,
    ]);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::AclData {
            handle: 0x0001,
            cid: 0x0040,
            data: AclReassemblyBuffer::from_slice(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap(),
        }]
    );
}

#[test]
fn acl_fragments_reassemble_exactly_once() {
    let (_mock, mut hci) = host();
    let payload: Vec<u8> = (0u8..20).collect();

    // start fragment declares 20 bytes, carries 10
    let mut start = vec![0x02, 0x01, 0x20, 0x0e, 0x00, 0x14, 0x00, 0x41, 0x00];
    start.extend_from_slice(&payload[..10]);
    hci.on_data(&start);
    assert_eq!(drain(&mut hci), vec![]);

    // continuation carries the remaining 10
    let mut cont = vec![0x02, 0x01, 0x10, 0x0a, 0x00];
    cont.extend_from_slice(&payload[10..]);
    hci.on_data(&cont);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::AclData {
            handle: 0x0001,
            cid: 0x0041,
            data: AclReassemblyBuffer::from_slice(&payload).unwrap(),
        }]
    );

    // the buffer is gone: a further continuation has nowhere to land
    hci.on_data(&[0x02, 0x01, 0x10, 0x02, 0x00, 0xaa, 0xbb]);
    assert_eq!(drain(&mut hci), vec![]);
}

#[test]
fn acl_continuation_without_open_buffer_is_dropped() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x02, 0x01, 0x10, 0x03, 0x00, 0x01, 0x02, 0x03]);

    assert_eq!(drain(&mut hci), vec![]);
}

#[test]
fn malformed_packets_are_dropped() {
    let (_mock, mut hci) = host();

    hci.on_data(&[]);
    hci.on_data(&[0xaa, 0x00, 0x01]);
    // unhandled event code
    hci.on_data(&[0x04, 0x13, 0x05, 0x01, 0x00, 0x00, 0x01, 0x00]);
    // truncated command complete
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01]);

    assert_eq!(drain(&mut hci), vec![]);
}

#[test]
fn command_status_is_accepted_silently() {
    let (_mock, mut hci) = host();

    hci.on_data(&[0x04, 0x0f, 0x04, 0x00, 0x01, 0x06, 0x04]);

    assert_eq!(drain(&mut hci), vec![]);
}

#[test]
fn permission_denied_write_reports_unauthorized() {
    let (mock, mut hci) = host();
    mock.fail_writes_with(ErrorKind::PermissionDenied);

    hci.read_rssi(0x0001);

    assert_eq!(
        drain(&mut hci),
        vec![HciEvent::StateChange(AdapterState::Unauthorized)]
    );
}

#[test]
fn network_down_write_is_swallowed() {
    let (mock, mut hci) = host();
    mock.fail_writes_with(ErrorKind::NotConnected);

    hci.set_advertise_enable(true);
    hci.on_transport_error(ErrorKind::NotConnected);

    assert_eq!(drain(&mut hci), vec![]);
}

#[test]
fn command_encodings() {
    assert_eq!(
        CommandPacket::Disconnect {
            connection_handle: 0x0001,
            reason: 0x13,
        }
        .encode()
        .as_slice(),
        &[0x01, 0x06, 0x04, 0x03, 0x01, 0x00, 0x13]
    );
    assert_eq!(
        CommandPacket::ReadRssi {
            connection_handle: 0x0001,
        }
        .encode()
        .as_slice(),
        &[0x01, 0x05, 0x14, 0x02, 0x01, 0x00]
    );
    assert_eq!(
        CommandPacket::LeSetAdvertiseEnable { enable: true }
            .encode()
            .as_slice(),
        &[0x01, 0x0a, 0x20, 0x01, 0x01]
    );
}

#[test]
fn write_acl_data_encoding() {
    let (mock, mut hci) = host();

    hci.write_acl_data(0x0001, 0x0004, &[0x01, 0x02, 0x03]);

    assert_eq!(
        mock.written(),
        vec![vec![
            0x02, 0x01, 0x00, 0x07, 0x00, 0x03, 0x00, 0x04, 0x00, 0x01, 0x02, 0x03
        ]]
    );
}

#[test]
fn advertisement_with_service_uuid16() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising(&mut hci, None, &[Uuid::Uuid16(0x1800)], &[]);

    let written = mock.written();
    let opcodes: Vec<u16> = written.iter().map(|frame| opcode_of(frame)).collect();
    assert_eq!(opcodes, vec![0x2006, 0x200a, 0x2009, 0x2008]);

    // empty scan response
    assert_eq!(written[2], vec![0x01, 0x09, 0x20, 0x01, 0x00]);
    // flags then a 16-bit uuid list in wire order
    assert_eq!(
        written[3],
        vec![0x01, 0x08, 0x20, 0x08, 0x07, 0x02, 0x01, 0x06, 0x03, 0x03, 0x00, 0x18]
    );
}

#[test]
fn long_name_is_truncated_to_fill_advertisement() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let name = "0123456789012345678901234567890123456789";

    gap.start_advertising(&mut hci, Some(name), &[], &[]);

    let frame = mock.written().pop().unwrap();
    assert_eq!(opcode_of(&frame), 0x2008);
    assert_eq!(frame[4] as usize, 31);
    let advertisement = &frame[5..];
    assert_eq!(advertisement.len(), 31);
    assert_eq!(&advertisement[..3], &[0x02, 0x01, 0x06]);
    assert_eq!(advertisement[3], 27); // 1 + truncated name
    assert_eq!(advertisement[4], 0x08);
    assert_eq!(&advertisement[5..], &name.as_bytes()[..26]);
}

#[test]
fn advertisement_with_uuid128_and_name() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let uuid = [
        0xc9, 0x15, 0x15, 0x96, 0x54, 0x56, 0x64, 0xb3, 0x38, 0x45, 0x26, 0x5d, 0xf1, 0x62, 0x6a,
        0xa8,
    ];

    gap.start_advertising(&mut hci, Some("hi"), &[Uuid::Uuid128(uuid)], &[]);

    let frame = mock.written().pop().unwrap();
    let mut expected = vec![0x02, 0x01, 0x06, 0x11, 0x06];
    expected.extend_from_slice(&uuid);
    expected.extend_from_slice(&[0x03, 0x08, b'h', b'i']);
    assert_eq!(&frame[5..], expected.as_slice());
}

#[test]
fn uuid16_list_truncates_entrywise_to_capacity() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let uuids: Vec<Uuid> = (0u16..20).map(|i| Uuid::Uuid16(0x1800 + i)).collect();

    gap.start_advertising(&mut hci, None, &uuids, &[]);

    let frame = mock.written().pop().unwrap();
    let advertisement = &frame[5..];
    assert_eq!(advertisement.len(), 31);
    assert_eq!(advertisement[3], 27); // 1 + 13 whole uuids
    assert_eq!(advertisement[4], 0x03);
    assert_eq!(&advertisement[5..7], &[0x00, 0x18]);
}

#[test]
fn uuid128_list_drops_entries_that_cannot_fit() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let first = [0x11u8; 16];
    let second = [0x22u8; 16];

    gap.start_advertising(&mut hci, None, &[Uuid::Uuid128(first), Uuid::Uuid128(second)], &[]);

    let frame = mock.written().pop().unwrap();
    let mut expected = vec![0x02, 0x01, 0x06, 0x11, 0x06];
    expected.extend_from_slice(&first);
    assert_eq!(&frame[5..], expected.as_slice());
}

#[test]
fn ibeacon_advertisement() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let beacon: Vec<u8> = (0u8..16).collect();

    gap.start_advertising_ibeacon(&mut hci, &beacon);

    let written = mock.written();
    let frame = written.last().unwrap();
    assert_eq!(opcode_of(frame), 0x2008);
    let advertisement = &frame[5..];
    assert_eq!(advertisement.len(), 9 + 16);
    assert_eq!(&advertisement[..3], &[0x02, 0x01, 0x06]);
    assert_eq!(advertisement[3], 21); // manufacturer record length
    assert_eq!(advertisement[4], 0xff);
    assert_eq!(&advertisement[5..7], &[0x4c, 0x00]);
    assert_eq!(advertisement[7], 0x02);
    assert_eq!(advertisement[8], 16);
    assert_eq!(&advertisement[9..], beacon.as_slice());
}

#[test]
fn oversized_ibeacon_reports_error_without_transport() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let beacon = [0u8; 40];

    gap.start_advertising_ibeacon(&mut hci, &beacon);

    assert!(mock.written().is_empty());
    assert_eq!(
        drain_gap(&mut gap),
        vec![GapEvent::AdvertisingStart(Some(
            GapError::AdvertisementDataTooLong
        ))]
    );
}

#[test]
fn scan_response_takes_only_short_uuid_entries_with_data() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let service_data = [
        ServiceDataEntry {
            uuid: Uuid::Uuid16(0x1804),
            data: &[0x01, 0x02, 0x03],
        },
        ServiceDataEntry {
            uuid: Uuid::Uuid128([0u8; 16]),
            data: &[0x09],
        },
        ServiceDataEntry {
            uuid: Uuid::Uuid16(0x180a),
            data: &[],
        },
    ];

    gap.start_advertising(&mut hci, None, &[], &service_data);

    let written = mock.written();
    let scan_frame = &written[2];
    assert_eq!(opcode_of(scan_frame), 0x2009);
    assert_eq!(
        &scan_frame[4..],
        &[0x07, 0x06, 0x16, 0x04, 0x18, 0x01, 0x02, 0x03]
    );
}

#[test]
fn scan_response_entries_stop_at_offset_margin() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let big = [0xeeu8; 23];
    let service_data = [
        ServiceDataEntry {
            uuid: Uuid::Uuid16(0x1801),
            data: &big,
        },
        // 27 bytes written; 1 + 27 breaches the margin, entry dropped
        ServiceDataEntry {
            uuid: Uuid::Uuid16(0x1802),
            data: &[0x01],
        },
    ];

    gap.start_advertising(&mut hci, None, &[], &service_data);

    let written = mock.written();
    let scan_frame = &written[2];
    assert_eq!(scan_frame[4] as usize, 27);
    assert_eq!(scan_frame[5], 26); // 3 + 23
    assert_eq!(scan_frame[6], 0x16);
}

#[test]
fn oversized_eir_data_reports_error_without_transport() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising_with_eir_data(&mut hci, &[0u8; 32], &[]);
    assert_eq!(
        drain_gap(&mut gap),
        vec![GapEvent::AdvertisingStart(Some(
            GapError::AdvertisementDataTooLong
        ))]
    );

    gap.start_advertising_with_eir_data(&mut hci, &[0u8; 31], &[0u8; 32]);
    assert_eq!(
        drain_gap(&mut gap),
        vec![GapEvent::AdvertisingStart(Some(GapError::ScanDataTooLong))]
    );

    assert!(mock.written().is_empty());
}

#[test]
fn duplicate_start_does_not_reissue_enable() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);

    let written = mock.written();
    let enables = written
        .iter()
        .filter(|frame| opcode_of(frame) == 0x200a)
        .count();
    let data_sets = written
        .iter()
        .filter(|frame| opcode_of(frame) == 0x2008)
        .count();
    assert_eq!(enables, 1);
    assert_eq!(data_sets, 2);
}

#[test]
fn advertising_start_reports_controller_status() {
    let (_mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x0c]);
    pump(&mut hci, &mut gap);

    let events = drain_gap(&mut gap);
    assert_eq!(
        events,
        vec![GapEvent::AdvertisingStart(Some(GapError::Controller(
            ControllerError::CommandDisallowed
        )))]
    );
    let GapEvent::AdvertisingStart(Some(error)) = &events[0] else {
        unreachable!();
    };
    assert_eq!(format!("{error}"), "Command Disallowed");
}

#[test]
fn advertising_start_reports_unknown_status() {
    let (_mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0xf0]);
    pump(&mut hci, &mut gap);

    let events = drain_gap(&mut gap);
    assert_eq!(
        events,
        vec![GapEvent::AdvertisingStart(Some(GapError::UnknownStatus(
            0xf0
        )))]
    );
    let GapEvent::AdvertisingStart(Some(error)) = &events[0] else {
        unreachable!();
    };
    assert_eq!(format!("{error}"), "Unknown (240)");
}

#[test]
fn advertising_start_success_has_no_error() {
    let (_mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x00]);
    pump(&mut hci, &mut gap);

    assert_eq!(drain_gap(&mut gap), vec![GapEvent::AdvertisingStart(None)]);
}

#[test]
fn stop_before_any_start_still_reports_stop_once() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();

    gap.stop_advertising(&mut hci);
    assert_eq!(mock.written(), vec![vec![0x01, 0x0a, 0x20, 0x01, 0x00]]);

    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x00]);
    pump(&mut hci, &mut gap);

    assert_eq!(drain_gap(&mut gap), vec![GapEvent::AdvertisingStop]);
    assert_eq!(gap.poll_event(), None);
}

#[test]
fn advertising_restarts_after_stop() {
    let (mock, mut hci) = host();
    let mut gap = Gap::new();
    let enable_complete = [0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x00];

    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    hci.on_data(&enable_complete);
    pump(&mut hci, &mut gap);
    assert_eq!(drain_gap(&mut gap), vec![GapEvent::AdvertisingStart(None)]);

    gap.stop_advertising(&mut hci);
    hci.on_data(&enable_complete);
    pump(&mut hci, &mut gap);
    assert_eq!(drain_gap(&mut gap), vec![GapEvent::AdvertisingStop]);

    mock.clear_written();
    gap.start_advertising(&mut hci, Some("dev"), &[], &[]);
    let opcodes: Vec<u16> = mock.written().iter().map(|frame| opcode_of(frame)).collect();
    assert_eq!(opcodes, vec![0x2006, 0x200a, 0x2009, 0x2008]);
}

#[test]
fn enable_completion_without_start_or_stop_is_rejected() {
    let (_mock, mut hci) = host();
    let mut gap = Gap::new();

    hci.on_data(&[0x04, 0x0e, 0x04, 0x01, 0x0a, 0x20, 0x00]);
    pump(&mut hci, &mut gap);

    assert_eq!(drain_gap(&mut gap), vec![]);
}
