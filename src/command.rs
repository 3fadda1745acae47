use binrw::{binwrite, io::Cursor, BinWrite};
use heapless::Vec;

use crate::ad_structure::MAX_ADVERTISEMENT_LENGTH;
use crate::types::{hcicode, AddrType};

pub const CMD_PKT_HEADER_SIZE: usize = 4; // packet type + opcode + length
pub const CMD_PKT_PAYLOAD_MAX_SIZE: usize = 255;
pub const CMD_PKT_MAX_SIZE: usize = CMD_PKT_HEADER_SIZE + CMD_PKT_PAYLOAD_MAX_SIZE;
pub type CommandPacketBuffer = Vec<u8, CMD_PKT_MAX_SIZE>;

pub type AdvDataBuffer = Vec<u8, MAX_ADVERTISEMENT_LENGTH>;

pub mod opcodes {
    pub const LINK_CTL_OGF: u8 = 0x01;
    pub const STATUS_PARAM_OGF: u8 = 0x05;
    pub const LE_CTL_OGF: u8 = 0x08;

    pub const DISCONNECT_OCF: u16 = 0x0006;
    pub const READ_RSSI_OCF: u16 = 0x0005;
    pub const LE_SET_ADVERTISING_PARAMETERS_OCF: u16 = 0x0006;
    pub const LE_SET_ADVERTISING_DATA_OCF: u16 = 0x0008;
    pub const LE_SET_SCAN_RESPONSE_DATA_OCF: u16 = 0x0009;
    pub const LE_SET_ADVERTISE_ENABLE_OCF: u16 = 0x000a;

    pub const fn opcode(ogf: u8, ocf: u16) -> u16 {
        ((ogf as u16) << 10) | ocf
    }

    pub const DISCONNECT: u16 = opcode(LINK_CTL_OGF, DISCONNECT_OCF);
    pub const READ_RSSI: u16 = opcode(STATUS_PARAM_OGF, READ_RSSI_OCF);
    pub const LE_SET_ADVERTISING_PARAMETERS: u16 =
        opcode(LE_CTL_OGF, LE_SET_ADVERTISING_PARAMETERS_OCF);
    pub const LE_SET_ADVERTISING_DATA: u16 = opcode(LE_CTL_OGF, LE_SET_ADVERTISING_DATA_OCF);
    pub const LE_SET_SCAN_RESPONSE_DATA: u16 = opcode(LE_CTL_OGF, LE_SET_SCAN_RESPONSE_DATA_OCF);
    pub const LE_SET_ADVERTISE_ENABLE: u16 = opcode(LE_CTL_OGF, LE_SET_ADVERTISE_ENABLE_OCF);
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(repr(u8))]
pub enum AdvertisingType {
    AdvInd = 0x00,
    AdvDirectInd = 0x01,
    AdvScanInd = 0x02,
    AdvNonConnInd = 0x03,
    AdvDirectIndLowDuty = 0x04,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(repr(u8))]
pub enum OwnAddressType {
    Public = 0x00,
    Random = 0x01,
    ResolvablePrivateAddress = 0x02,
    ResolvablePrivateAddressFromIRK = 0x03,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(repr(u8))]
pub enum AdvertisingFilterPolicy {
    All = 0x00,
    ConnectAllScanFiltered = 0x01,
    ScanAllConnFiltered = 0x02,
    Filtered = 0x03,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct AdvertisingParameters {
    #[bw(map = |x: &u32| (x / 625) as u16)] // us V.4 P.E 7.8.5
    pub advertising_interval_min: u32,
    #[bw(map = |x: &u32| (x / 625) as u16)] // us V.4 P.E 7.8.5
    pub advertising_interval_max: u32,
    pub advertising_type: AdvertisingType,
    pub own_address_type: OwnAddressType,
    pub peer_address_type: AddrType,
    pub peer_address: [u8; 6],
    pub advertising_channel_map: u8,
    pub filter_policy: AdvertisingFilterPolicy,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            advertising_interval_min: 100_000,
            advertising_interval_max: 100_000,
            advertising_type: AdvertisingType::AdvInd,
            own_address_type: OwnAddressType::Public,
            peer_address_type: AddrType::Public,
            peer_address: [0u8; 6],
            advertising_channel_map: 0x07,
            filter_policy: AdvertisingFilterPolicy::All,
        }
    }
}

#[binwrite]
#[bw(little)]
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandPacket {
    LeSetAdvertisingParameters {
        #[bw(calc(opcodes::LE_SET_ADVERTISING_PARAMETERS))]
        opcode: u16,

        #[bw(calc(15u8))]
        len: u8,
        params: AdvertisingParameters,
    },

    LeSetAdvertisingData {
        #[bw(calc(opcodes::LE_SET_ADVERTISING_DATA))]
        opcode: u16,

        #[bw(calc((data.len() + 1) as u8))]
        len: u8,
        #[bw(calc(data.len() as u8))]
        data_len: u8,
        #[bw(map = |x| x.as_slice())]
        data: AdvDataBuffer,
    },

    LeSetScanResponseData {
        #[bw(calc(opcodes::LE_SET_SCAN_RESPONSE_DATA))]
        opcode: u16,

        #[bw(calc((data.len() + 1) as u8))]
        len: u8,
        #[bw(calc(data.len() as u8))]
        data_len: u8,
        #[bw(map = |x| x.as_slice())]
        data: AdvDataBuffer,
    },

    LeSetAdvertiseEnable {
        #[bw(calc(opcodes::LE_SET_ADVERTISE_ENABLE))]
        opcode: u16,

        #[bw(calc(1u8))]
        len: u8,
        #[bw(map = |x: &bool| if *x { 0x01u8 } else { 0x00u8 })] // V.4 P.E 7.8.9
        enable: bool,
    },

    Disconnect {
        #[bw(calc(opcodes::DISCONNECT))]
        opcode: u16,

        #[bw(calc(3u8))]
        len: u8,
        connection_handle: u16,
        reason: u8,
    },

    ReadRssi {
        #[bw(calc(opcodes::READ_RSSI))]
        opcode: u16,

        #[bw(calc(2u8))]
        len: u8,
        connection_handle: u16,
    },
}

impl CommandPacket {
    pub fn encode(&self) -> CommandPacketBuffer {
        let mut buf = [0u8; CMD_PKT_MAX_SIZE];
        let mut writer = Cursor::new(&mut buf[..]);
        hcicode::COMMAND.write_le(&mut writer).unwrap();
        self.write(&mut writer).unwrap();
        let len = writer.position() as usize;
        CommandPacketBuffer::from_slice(&buf[..len]).unwrap()
    }

    pub fn opcode(&self) -> u16 {
        use CommandPacket::*;
        match self {
            LeSetAdvertisingParameters { .. } => opcodes::LE_SET_ADVERTISING_PARAMETERS,
            LeSetAdvertisingData { .. } => opcodes::LE_SET_ADVERTISING_DATA,
            LeSetScanResponseData { .. } => opcodes::LE_SET_SCAN_RESPONSE_DATA,
            LeSetAdvertiseEnable { .. } => opcodes::LE_SET_ADVERTISE_ENABLE,
            Disconnect { .. } => opcodes::DISCONNECT,
            ReadRssi { .. } => opcodes::READ_RSSI,
        }
    }
}
