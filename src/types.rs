use alloc::boxed::Box;

use binrw::{
    io::{Cursor, Read, Seek},
    BinRead, BinResult, BinWrite, Endian,
};
use fixedstr::{str32, str_format};
use heapless::Vec;
use modular_bitfield::{bitfield, prelude::*};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror_no_std::Error;

pub const EVT_PKT_HEADER_SIZE: usize = 2;
pub const EVT_PKT_PAYLOAD_MAX_SIZE: usize = 255;
pub const EVT_PKT_MAX_SIZE: usize = EVT_PKT_HEADER_SIZE + EVT_PKT_PAYLOAD_MAX_SIZE;

pub const EVT_CMD_COMPLETE_HEADER_SIZE: usize = 3;
pub const EVT_CMD_COMPLETE_PARAMS_MAX_SIZE: usize =
    EVT_PKT_PAYLOAD_MAX_SIZE - EVT_CMD_COMPLETE_HEADER_SIZE;
pub type ReturnParameters = Vec<u8, EVT_CMD_COMPLETE_PARAMS_MAX_SIZE>;

pub const ACL_PKT_HEADER_SIZE: usize = 4;
pub const ACL_PKT_PAYLOAD_MAX_SIZE: usize = 255;
pub const ACL_PKT_MAX_SIZE: usize = 1 + ACL_PKT_HEADER_SIZE + ACL_PKT_PAYLOAD_MAX_SIZE;
pub type AclPayloadBuffer = Vec<u8, ACL_PKT_PAYLOAD_MAX_SIZE>;
pub type AclPacketBuffer = Vec<u8, ACL_PKT_MAX_SIZE>;

pub mod hcicode {
    pub const COMMAND: u8 = 0x01;
    pub const ACL_DATA: u8 = 0x02;
    pub const SYNC_DATA: u8 = 0x03;
    pub const EVENT: u8 = 0x04;
    pub const ISO_DATA: u8 = 0x05;
}

pub mod eventcode {
    pub const DISCONNECTION_COMPLETE: u8 = 0x05;
    pub const ENCRYPTION_CHANGE: u8 = 0x08;
    pub const COMMAND_COMPLETE: u8 = 0x0e;
    pub const COMMAND_STATUS: u8 = 0x0f;
    pub const LE_META: u8 = 0x3e;
}

/// Controller address in wire (little-endian) byte order.
#[derive(BinRead, Default, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Colon-separated hex with the most significant byte first.
    pub fn to_colon_hex(&self) -> str32 {
        let b = &self.0;
        str_format!(
            str32,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}

// Vol 1. Part F. 1.3
#[derive(Error, TryFromPrimitive, IntoPrimitive, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControllerError {
    #[error("Unknown HCI Command")]
    UnknownHciCommand = 0x01,
    #[error("Unknown Connection Identifier")]
    UnknownConnectionIdentifier = 0x02,
    #[error("Hardware Failure")]
    HardwareFailure = 0x03,
    #[error("Page Timeout")]
    PageTimeout = 0x04,
    #[error("Authentication Failure")]
    AuthenticationFailure = 0x05,
    #[error("PIN or Key Missing")]
    PinOrKeyMissing = 0x06,
    #[error("Memory Capacity Exceeded")]
    MemoryCapacityExceeded = 0x07,
    #[error("Connection Timeout")]
    ConnectionTimeout = 0x08,
    #[error("Connection Limit Exceeded")]
    ConnectionLimitExceeded = 0x09,
    #[error("Synchronous Connection Limit To A Device Exceeded")]
    SynchronousConnectionLimitToADeviceExceeded = 0x0a,
    #[error("Connection Already Exists")]
    ConnectionAlreadyExists = 0x0b,
    #[error("Command Disallowed")]
    CommandDisallowed = 0x0c,
    #[error("Connection Rejected due to Limited Resources")]
    ConnectionRejectedDueToLimitedResources = 0x0d,
    #[error("Connection Rejected Due To Security Reasons")]
    ConnectionRejectedDueToSecurityReasons = 0x0e,
    #[error("Connection Rejected due to Unacceptable BD_ADDR")]
    ConnectionRejectedDueToUnacceptableBDADDR = 0x0f,
    #[error("Connection Accept Timeout Exceeded")]
    ConnectionAcceptTimeoutExceeded = 0x10,
    #[error("Unsupported Feature or Parameter Value")]
    UnsupportedFeatureOrParameterValue = 0x11,
    #[error("Invalid HCI Command Parameters")]
    InvalidHciCommandParameters = 0x12,
    #[error("Remote User Terminated Connection")]
    RemoteUserTerminatedConnection = 0x13,
    #[error("Remote Device Terminated Connection due to Low Resources")]
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    #[error("Remote Device Terminated Connection due to Power Off")]
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    #[error("Connection Terminated By Local Host")]
    ConnectionTerminatedByLocalHost = 0x16,
    #[error("Repeated Attempts")]
    RepeatedAttempts = 0x17,
    #[error("Pairing Not Allowed")]
    PairingNotAllowed = 0x18,
    #[error("Unknown LMP PDU")]
    UnknownLmpPdu = 0x19,
    #[error("Unsupported Remote Feature")]
    UnsupportedRemoteFeature = 0x1a,
    #[error("SCO Offset Rejected")]
    ScoOffsetRejected = 0x1b,
    #[error("SCO Interval Rejected")]
    ScoIntervalRejected = 0x1c,
    #[error("SCO Air Mode Rejected")]
    ScoAirModeRejected = 0x1d,
    #[error("Invalid LMP Parameters / Invalid LL Parameters")]
    InvalidLmpOrLlParameters = 0x1e,
    #[error("Unspecified Error")]
    UnspecifiedError = 0x1f,
    #[error("Unsupported LMP Parameter Value / Unsupported LL Parameter Value")]
    UnsupportedLmpOrLlParameterValue = 0x20,
    #[error("Role Change Not Allowed")]
    RoleChangeNotAllowed = 0x21,
    #[error("LMP Response Timeout / LL Response Timeout")]
    LmpOrLlResponseTimeout = 0x22,
    #[error("LMP Error Transaction Collision / LL Procedure Collision")]
    LmpTransactionOrLlProcedureCollision = 0x23,
    #[error("LMP PDU Not Allowed")]
    LmpPduNotAllowed = 0x24,
    #[error("Encryption Mode Not Acceptable")]
    EncryptionModeNotAcceptable = 0x25,
    #[error("Link Key cannot be Changed")]
    LinkKeyCannotBeChanged = 0x26,
    #[error("Requested QoS Not Supported")]
    RequestedQosNotSupported = 0x27,
    #[error("Instant Passed")]
    InstantPassed = 0x28,
    #[error("Pairing With Unit Key Not Supported")]
    PairingWithUnitKeyNotSupported = 0x29,
    #[error("Different Transaction Collision")]
    DifferentTransactionCollision = 0x2a,
    // Reserved for future use = 0x2b,
    #[error("QoS Unacceptable Parameter")]
    QosUnacceptableParameter = 0x2c,
    #[error("QoS Rejected")]
    QosRejected = 0x2d,
    #[error("Channel Classification Not Supported")]
    ChannelClassificationNotSupported = 0x2e,
    #[error("Insufficient Security")]
    InsufficientSecurity = 0x2f,
    #[error("Parameter Out Of Mandatory Range")]
    ParameterOutOfMandatoryRange = 0x30,
    // Reserved for future use = 0x31,
    #[error("Role Switch Pending")]
    RoleSwitchPending = 0x32,
    // Reserved for future use = 0x33,
    #[error("Reserved Slot Violation")]
    ReservedSlotViolation = 0x34,
    #[error("Role Switch Failed")]
    RoleSwitchFailed = 0x35,
    #[error("Extended Inquiry Response Too Large")]
    ExtendedInquiryResponseTooLarge = 0x36,
    #[error("Secure Simple Pairing Not Supported By Host")]
    SecureSimplePairingNotSupportedByHost = 0x37,
    #[error("Host Busy - Pairing")]
    HostBusyPairing = 0x38,
    #[error("Connection Rejected due to No Suitable Channel Found")]
    ConnectionRejectedDueToNoSuitableChannelFound = 0x39,
    #[error("Controller Busy")]
    ControllerBusy = 0x3a,
    #[error("Unacceptable Connection Parameters")]
    UnacceptableConnectionParameters = 0x3b,
    #[error("Advertising Timeout")]
    AdvertisingTimeout = 0x3c,
    #[error("Connection Terminated due to MIC Failure")]
    ConnectionTerminatedDueToMicFailure = 0x3d,
    #[error("Connection Failed to be Established / Synchronization Timeout")]
    ConnectionFailedToBeEstablishedOrSynchronizationTimeout = 0x3e,
    // Previously used = 0x3f
    #[error("Coarse Clock Adjustment Rejected but Will Try to Adjust Using Clock Dragging")]
    CoarseClockAdjustmentRejected = 0x40,
    #[error("Type0 Submap Not Defined")]
    Type0SubmapNotDefined = 0x41,
    #[error("Unknown Advertising Identifier")]
    UnknownAdvertisingIdentifier = 0x42,
    #[error("Limit Reached")]
    LimitReached = 0x43,
    #[error("Operation Cancelled by Host")]
    OperationCancelledByHost = 0x44,
    #[error("Packet Too Long")]
    PacketTooLong = 0x45,
    #[error("Too Late")]
    TooLate = 0x46,
    #[error("Too Early")]
    TooEarly = 0x47,
}

#[derive(BinRead, BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
pub enum Role {
    Central = 0x00,
    Peripheral = 0x01,
}

#[derive(BinRead, BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
pub enum AddrType {
    Public = 0x00,
    Random = 0x01,
}

#[derive(BinRead, BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
pub enum CentralClockAccuracy {
    PPM500 = 0x00,
    PPM250 = 0x01,
    PPM150 = 0x02,
    PPM100 = 0x03,
    PPM75 = 0x04,
    PPM50 = 0x05,
    PPM30 = 0x06,
    PPM20 = 0x07,
}

fn parse_vec<R: Read + Seek, const N: usize>(
    count: usize,
    reader: &mut R,
    endian: Endian,
) -> BinResult<Vec<u8, N>> {
    let mut ret = Vec::new();
    for _ in 0..count {
        let byte = u8::read_options(reader, endian, ())?;
        ret.push(byte).map_err(|_| binrw::Error::Custom {
            pos: 0,
            err: Box::new("payload exceeds buffer capacity"),
        })?;
    }
    Ok(ret)
}

#[binrw::parser(reader, endian)]
fn parse_command_complete_params(count: u8) -> BinResult<ReturnParameters> {
    parse_vec(count as usize, reader, endian)
}

#[binrw::parser(reader, endian)]
fn parse_acl_payload(count: u16) -> BinResult<AclPayloadBuffer> {
    if count as usize > ACL_PKT_PAYLOAD_MAX_SIZE {
        return Err(binrw::Error::Custom {
            pos: 0,
            err: Box::new("acl payload exceeds buffer capacity"),
        });
    }
    parse_vec(count as usize, reader, endian)
}

#[derive(BinRead, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub enum EventPacket {
    #[br(magic = 0x05u8)]
    DisconnectionComplete {
        #[br(assert(len == 4, "size error, {}", len))]
        len: u8,
        status: u8,
        connection_handle: u16,
        reason: u8,
    },
    #[br(magic = 0x08u8)]
    EncryptionChange {
        #[br(assert(len == 4, "size error, {}", len))]
        len: u8,
        status: u8,
        connection_handle: u16,
        #[br(map = |x: u8| x != 0x00)]
        enabled: bool,
    },
    #[br(magic = 0x0eu8)]
    CommandComplete {
        #[br(assert(len > 3, "size error, {}", len))]
        len: u8,
        num_hci_command_packets: u8,
        command_opcode: u16,
        #[br(parse_with = parse_command_complete_params, args(len - 3))]
        return_parameters: ReturnParameters,
    },
    #[br(magic = 0x0fu8)]
    CommandStatus {
        #[br(assert(len == 4, "size error, {}", len))]
        len: u8,
        status: u8,
        num_hci_command_packets: u8,
        command_opcode: u16,
    },
    #[br(magic = 0x3eu8)]
    LeMeta { len: u8, packet: LeEventPacket },
}

#[derive(BinRead, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub enum LeEventPacket {
    #[br(magic = 0x01u8)]
    ConnectionComplete {
        status: u8,
        connection_handle: u16,
        role: Role,
        peer_address_type: AddrType,
        peer_address: BdAddr,
        #[br(map = |x: u16| x as u32 * 1250)] // us V.4 P.E 7.7.65
        connection_interval: u32,
        peripheral_latency: u16,
        #[br(map = |x: u16| x as u32 * 10)] // ms V.4 P.E 7.7.65
        supervision_timeout: u32,
        central_clock_accuracy: CentralClockAccuracy,
    },
    #[br(magic = 0x03u8)]
    ConnectionUpdateComplete {
        status: u8,
        connection_handle: u16,
        #[br(map = |x: u16| x as u32 * 1250)] // us V.4 P.E 7.7.65
        connection_interval: u32,
        peripheral_latency: u16,
        #[br(map = |x: u16| x as u32 * 10)] // ms V.4 P.E 7.7.65
        supervision_timeout: u32,
    },
}

#[derive(BitfieldSpecifier, Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bits = 2]
pub enum AclBoundaryFlag {
    FirstNonAutoFlushable,
    Continuing,
    FirstAutoFlushable,
    Unused,
}

#[derive(BitfieldSpecifier, Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bits = 2]
pub enum AclBroadcastFlag {
    PointToPoint,
    BrEdrBroadcast,
    Reserved1,
    Reserved2,
}

#[bitfield]
#[derive(BinRead, BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(map = Self::from_bytes)]
#[bw(map = |&x| Self::into_bytes(x))]
pub struct AclDataHeader {
    pub handle: B12,
    pub packet_boundary_flag: AclBoundaryFlag,
    pub broadcast_flag: AclBroadcastFlag,
}

#[derive(BinRead, BinWrite, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(little)]
pub struct AclDataPacket {
    pub header: AclDataHeader,
    pub len: u16,
    #[br(parse_with = parse_acl_payload, args(len))]
    #[bw(map = |x| x.as_slice())]
    pub data: AclPayloadBuffer,
}

impl AclDataPacket {
    pub fn new(handle: u16, pb: AclBoundaryFlag, bc: AclBroadcastFlag, payload: &[u8]) -> Self {
        Self {
            header: AclDataHeader::new()
                .with_handle(handle)
                .with_packet_boundary_flag(pb)
                .with_broadcast_flag(bc),
            len: payload.len() as u16,
            data: AclPayloadBuffer::from_slice(payload).unwrap(),
        }
    }

    pub fn encode(&self) -> AclPacketBuffer {
        let mut buf = [0u8; ACL_PKT_MAX_SIZE];
        let mut writer = Cursor::new(&mut buf[..]);
        hcicode::ACL_DATA.write_le(&mut writer).unwrap();
        self.write(&mut writer).unwrap();
        let len = writer.position() as usize;
        AclPacketBuffer::from_slice(&buf[..len]).unwrap()
    }
}

#[derive(BinRead, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub enum HciPacket {
    #[br(magic = 0x01u8)]
    Command,
    #[br(magic = 0x02u8)]
    AclData(AclDataPacket),
    #[br(magic = 0x03u8)]
    SyncData,
    #[br(magic = 0x04u8)]
    Event(EventPacket),
    #[br(magic = 0x05u8)]
    IsoData,
}
