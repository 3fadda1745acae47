#![no_std]

extern crate alloc;

#[cfg(not(feature = "defmt"))]
use log::{debug, trace, warn};

#[cfg(feature = "defmt")]
use defmt::{debug, trace, warn};

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("log and defmt can't have both!");

pub mod ad_structure;
pub mod command;
pub mod gap;
pub mod transport;
pub mod types;

use binrw::{io::Cursor, BinRead};
use embedded_io::Error as _;
use heapless::{Deque, FnvIndexMap, Vec};

use ad_structure::MAX_ADVERTISEMENT_LENGTH;
use command::{opcodes, AdvDataBuffer, AdvertisingParameters, CommandPacket};
use types::{
    eventcode, hcicode, AclBoundaryFlag, AclBroadcastFlag, AclDataPacket, AclPayloadBuffer,
    AddrType, BdAddr, CentralClockAccuracy, EventPacket, HciPacket, LeEventPacket, Role,
};

pub use embedded_io::ErrorKind;
pub use gap::{AdvertiseState, Gap, GapError, GapEvent};
pub use transport::Transport;
pub use types::ControllerError;

/// Interval between controller up/down probes.
pub const DEV_UP_POLL_INTERVAL_MILLIS: u64 = 1000;

/// Upper bound on a reassembled ACL payload; larger declared totals are
/// dropped.
pub const ACL_REASSEMBLY_MAX_SIZE: usize = 512;

const ACL_HANDLE_BUFFERS: usize = 4;
const EVENT_QUEUE_SIZE: usize = 8;

pub type AclReassemblyBuffer = Vec<u8, ACL_REASSEMBLY_MAX_SIZE>;

#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Unauthorized,
}

#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciEvent {
    StateChange(AdapterState),
    DisconnectionComplete {
        handle: u16,
        reason: u8,
    },
    EncryptionChange {
        handle: u16,
        encrypted: bool,
    },
    LeConnectionComplete {
        status: u8,
        handle: u16,
        role: Role,
        peer_address_type: AddrType,
        peer_address: BdAddr,
        connection_interval: u32, // us
        peripheral_latency: u16,
        supervision_timeout: u32, // ms
        central_clock_accuracy: CentralClockAccuracy,
    },
    LeConnectionUpdateComplete {
        status: u8,
        handle: u16,
        connection_interval: u32, // us
        peripheral_latency: u16,
        supervision_timeout: u32, // ms
    },
    LeAdvertisingParametersSet {
        status: u8,
    },
    LeAdvertisingDataSet {
        status: u8,
    },
    LeScanResponseDataSet {
        status: u8,
    },
    LeAdvertiseEnableSet {
        status: u8,
    },
    RssiRead {
        handle: u16,
        rssi: i8,
    },
    AclData {
        handle: u16,
        cid: u16,
        data: AclReassemblyBuffer,
    },
}

struct AclAssembly {
    length: usize,
    cid: u16,
    data: AclReassemblyBuffer,
}

/// Kernel filter admitting the event and ACL traffic the link layer
/// consumes: type mask, two 32-bit event masks, opcode (0 = all).
pub fn event_filter() -> [u8; 14] {
    let type_mask: u32 = (1u32 << hcicode::EVENT) | (1u32 << hcicode::ACL_DATA);
    let event_mask_low: u32 = (1u32 << eventcode::DISCONNECTION_COMPLETE)
        | (1u32 << eventcode::ENCRYPTION_CHANGE)
        | (1u32 << eventcode::COMMAND_COMPLETE)
        | (1u32 << eventcode::COMMAND_STATUS);
    let event_mask_high: u32 = 1u32 << (eventcode::LE_META - 32);
    let opcode: u16 = 0;

    let mut filter = [0u8; 14];
    filter[0..4].copy_from_slice(&type_mask.to_le_bytes());
    filter[4..8].copy_from_slice(&event_mask_low.to_le_bytes());
    filter[8..12].copy_from_slice(&event_mask_high.to_le_bytes());
    filter[12..14].copy_from_slice(&opcode.to_le_bytes());
    filter
}

pub struct Hci<T, F> {
    transport: T,
    get_millis: F,
    address: BdAddr,
    address_type: AddrType,
    is_dev_up: Option<bool>,
    last_dev_poll: Option<u64>,
    acl_buffers: FnvIndexMap<u16, AclAssembly, ACL_HANDLE_BUFFERS>,
    events: Deque<HciEvent, EVENT_QUEUE_SIZE>,
}

impl<T, F> Hci<T, F>
where
    T: Transport,
    F: Fn() -> u64,
{
    pub fn new(transport: T, get_millis: F) -> Self {
        Self {
            transport,
            get_millis,
            address: BdAddr::default(),
            address_type: AddrType::Public,
            is_dev_up: None,
            last_dev_poll: None,
            acl_buffers: FnvIndexMap::new(),
            events: Deque::new(),
        }
    }

    fn millis(&self) -> u64 {
        (self.get_millis)()
    }

    /// Capture the controller address and run the first liveness probe.
    pub fn init(&mut self) {
        self.address = self.transport.local_address();
        self.address_type = AddrType::Public;
        debug!("hci address = {}", self.address.to_colon_hex().as_str());
        self.tick();
    }

    pub fn address(&self) -> BdAddr {
        self.address
    }

    pub fn address_type(&self) -> AddrType {
        self.address_type
    }

    /// Drive the periodic liveness poll. Call from the host loop; probes
    /// the transport at most once per [`DEV_UP_POLL_INTERVAL_MILLIS`], so a
    /// poll never overlaps its predecessor.
    pub fn tick(&mut self) {
        let now = self.millis();
        if let Some(last) = self.last_dev_poll {
            if now.wrapping_sub(last) < DEV_UP_POLL_INTERVAL_MILLIS {
                return;
            }
        }
        self.last_dev_poll = Some(now);
        self.poll_dev_up();
    }

    fn poll_dev_up(&mut self) {
        let is_dev_up = self.transport.is_dev_up();
        if self.is_dev_up != Some(is_dev_up) {
            if is_dev_up {
                debug!("hci device up, bootstrapping");
                self.install_event_filter();
                self.set_advertise_enable(false);
                self.set_advertising_parameters();
            } else {
                debug!("hci device down");
                self.push_event(HciEvent::StateChange(AdapterState::PoweredOff));
            }
            self.is_dev_up = Some(is_dev_up);
        }
    }

    fn install_event_filter(&mut self) {
        let filter = event_filter();
        if let Err(e) = self.transport.set_filter(&filter) {
            self.on_transport_error(e.kind());
        }
    }

    pub fn set_advertising_parameters(&mut self) {
        self.send_command(CommandPacket::LeSetAdvertisingParameters {
            params: AdvertisingParameters::default(),
        });
    }

    pub fn set_advertising_data(&mut self, data: &[u8]) {
        let data = &data[..data.len().min(MAX_ADVERTISEMENT_LENGTH)];
        self.send_command(CommandPacket::LeSetAdvertisingData {
            data: AdvDataBuffer::from_slice(data).unwrap(),
        });
    }

    pub fn set_scan_response_data(&mut self, data: &[u8]) {
        let data = &data[..data.len().min(MAX_ADVERTISEMENT_LENGTH)];
        self.send_command(CommandPacket::LeSetScanResponseData {
            data: AdvDataBuffer::from_slice(data).unwrap(),
        });
    }

    pub fn set_advertise_enable(&mut self, enabled: bool) {
        self.send_command(CommandPacket::LeSetAdvertiseEnable { enable: enabled });
    }

    pub fn disconnect(&mut self, handle: u16, reason: u8) {
        self.send_command(CommandPacket::Disconnect {
            connection_handle: handle,
            reason,
        });
    }

    pub fn read_rssi(&mut self, handle: u16) {
        self.send_command(CommandPacket::ReadRssi {
            connection_handle: handle,
        });
    }

    /// Outbound ACL start fragment carrying an L2CAP-framed payload.
    pub fn write_acl_data(&mut self, handle: u16, cid: u16, data: &[u8]) {
        if data.len() + 4 > types::ACL_PKT_PAYLOAD_MAX_SIZE {
            warn!("acl payload too long, dropping write");
            return;
        }
        let mut payload = AclPayloadBuffer::new();
        payload
            .extend_from_slice(&(data.len() as u16).to_le_bytes())
            .unwrap();
        payload.extend_from_slice(&cid.to_le_bytes()).unwrap();
        payload.extend_from_slice(data).unwrap();
        let packet = AclDataPacket::new(
            handle,
            AclBoundaryFlag::FirstNonAutoFlushable,
            AclBroadcastFlag::PointToPoint,
            payload.as_slice(),
        );
        debug!("write acl data, handle = {:x}, cid = {:x}", handle, cid);
        let encoded = packet.encode();
        self.write_bytes(encoded.as_slice());
    }

    fn send_command(&mut self, cmd: CommandPacket) {
        debug!("write command, opcode = {:x}", cmd.opcode());
        let encoded = cmd.encode();
        self.write_bytes(encoded.as_slice());
    }

    // fire-and-forget: a failed write surfaces only through error
    // classification, never to the sender
    fn write_bytes(&mut self, bytes: &[u8]) {
        if let Err(e) = self.transport.write(bytes) {
            self.on_transport_error(e.kind());
        }
    }

    /// Feed one raw frame received from the transport.
    pub fn on_data(&mut self, bytes: &[u8]) {
        trace!("hci data in, {} bytes", bytes.len());
        let mut cursor = Cursor::new(bytes);
        match HciPacket::read(&mut cursor) {
            Ok(HciPacket::Event(event)) => self.on_event_packet(event),
            Ok(HciPacket::AclData(packet)) => self.on_acl_packet(packet),
            Ok(_) => trace!("ignoring non event/acl packet"),
            Err(_) => warn!("dropping malformed hci packet"),
        }
    }

    /// Classify a transport-level failure reported by the host loop.
    pub fn on_transport_error(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::PermissionDenied => {
                self.push_event(HciEvent::StateChange(AdapterState::Unauthorized));
            }
            // transient while the interface toggles
            ErrorKind::NotConnected => trace!("hci transport reports device down"),
            _ => warn!("unclassified hci transport error"),
        }
    }

    fn on_event_packet(&mut self, event: EventPacket) {
        match event {
            EventPacket::DisconnectionComplete {
                connection_handle,
                reason,
                ..
            } => {
                self.push_event(HciEvent::DisconnectionComplete {
                    handle: connection_handle,
                    reason,
                });
            }
            EventPacket::EncryptionChange {
                connection_handle,
                enabled,
                ..
            } => {
                self.push_event(HciEvent::EncryptionChange {
                    handle: connection_handle,
                    encrypted: enabled,
                });
            }
            EventPacket::CommandComplete {
                command_opcode,
                return_parameters,
                ..
            } => self.on_command_complete(command_opcode, return_parameters.as_slice()),
            EventPacket::CommandStatus { command_opcode, .. } => {
                trace!("command status for opcode {:x}", command_opcode);
            }
            EventPacket::LeMeta { packet, .. } => self.on_le_meta(packet),
        }
    }

    fn on_command_complete(&mut self, opcode: u16, return_parameters: &[u8]) {
        let status = return_parameters.first().copied().unwrap_or(0);
        debug!("command complete, opcode = {:x}, status = {:x}", opcode, status);
        match opcode {
            opcodes::LE_SET_ADVERTISING_PARAMETERS => {
                // completion of the baseline parameter programming doubles
                // as the controller readiness signal
                self.push_event(HciEvent::StateChange(AdapterState::PoweredOn));
                self.push_event(HciEvent::LeAdvertisingParametersSet { status });
            }
            opcodes::LE_SET_ADVERTISING_DATA => {
                self.push_event(HciEvent::LeAdvertisingDataSet { status });
            }
            opcodes::LE_SET_SCAN_RESPONSE_DATA => {
                self.push_event(HciEvent::LeScanResponseDataSet { status });
            }
            opcodes::LE_SET_ADVERTISE_ENABLE => {
                self.push_event(HciEvent::LeAdvertiseEnableSet { status });
            }
            opcodes::READ_RSSI => {
                if return_parameters.len() < 4 {
                    warn!("short read rssi return parameters, dropping");
                    return;
                }
                let handle = u16::from_le_bytes([return_parameters[1], return_parameters[2]]);
                let rssi = return_parameters[3] as i8;
                self.push_event(HciEvent::RssiRead { handle, rssi });
            }
            _ => trace!("command complete for untracked opcode {:x}", opcode),
        }
    }

    fn on_le_meta(&mut self, packet: LeEventPacket) {
        match packet {
            LeEventPacket::ConnectionComplete {
                status,
                connection_handle,
                role,
                peer_address_type,
                peer_address,
                connection_interval,
                peripheral_latency,
                supervision_timeout,
                central_clock_accuracy,
            } => {
                debug!(
                    "le connection complete, handle = {:x}, address = {}",
                    connection_handle,
                    peer_address.to_colon_hex().as_str()
                );
                self.push_event(HciEvent::LeConnectionComplete {
                    status,
                    handle: connection_handle,
                    role,
                    peer_address_type,
                    peer_address,
                    connection_interval,
                    peripheral_latency,
                    supervision_timeout,
                    central_clock_accuracy,
                });
            }
            LeEventPacket::ConnectionUpdateComplete {
                status,
                connection_handle,
                connection_interval,
                peripheral_latency,
                supervision_timeout,
            } => {
                self.push_event(HciEvent::LeConnectionUpdateComplete {
                    status,
                    handle: connection_handle,
                    connection_interval,
                    peripheral_latency,
                    supervision_timeout,
                });
            }
        }
    }

    fn on_acl_packet(&mut self, packet: AclDataPacket) {
        let handle = packet.header.handle();
        match packet.header.packet_boundary_flag() {
            AclBoundaryFlag::FirstAutoFlushable => {
                let payload = packet.data.as_slice();
                if payload.len() < 4 {
                    warn!("acl start fragment too short, dropping");
                    return;
                }
                let length = u16::from_le_bytes([payload[0], payload[1]]) as usize;
                let cid = u16::from_le_bytes([payload[2], payload[3]]);
                let body = &payload[4..];
                if body.len() == length {
                    self.push_event(HciEvent::AclData {
                        handle,
                        cid,
                        data: AclReassemblyBuffer::from_slice(body).unwrap(),
                    });
                } else if length > ACL_REASSEMBLY_MAX_SIZE {
                    warn!("acl total length {} over reassembly limit, dropping", length);
                } else {
                    let mut data = AclReassemblyBuffer::new();
                    data.extend_from_slice(body).unwrap();
                    // a fresh start fragment replaces any half-assembled
                    // packet for the handle
                    if self
                        .acl_buffers
                        .insert(handle, AclAssembly { length, cid, data })
                        .is_err()
                    {
                        warn!("acl reassembly table full, dropping handle {:x}", handle);
                    }
                }
            }
            AclBoundaryFlag::Continuing => {
                let Some(assembly) = self.acl_buffers.get_mut(&handle) else {
                    warn!("acl continuation without open buffer, handle {:x}", handle);
                    return;
                };
                let overflow = assembly
                    .data
                    .extend_from_slice(packet.data.as_slice())
                    .is_err();
                let complete = !overflow && assembly.data.len() == assembly.length;
                if overflow {
                    warn!("acl reassembly overflow, dropping handle {:x}", handle);
                    self.acl_buffers.remove(&handle);
                } else if complete {
                    let assembly = self.acl_buffers.remove(&handle).unwrap();
                    self.push_event(HciEvent::AclData {
                        handle,
                        cid: assembly.cid,
                        data: assembly.data,
                    });
                }
            }
            _ => trace!("ignoring acl fragment with unhandled boundary flag"),
        }
    }

    /// Drain the next link-layer notification.
    pub fn poll_event(&mut self) -> Option<HciEvent> {
        self.events.pop_front()
    }

    fn push_event(&mut self, event: HciEvent) {
        if self.events.push_back(event).is_err() {
            warn!("hci event queue full, dropping event");
        }
    }
}
