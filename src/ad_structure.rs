use heapless::Vec;
use thiserror_no_std::Error;

/// Advertising PDU payload limit, shared by advertisement and scan response
/// data.
pub const MAX_ADVERTISEMENT_LENGTH: usize = 31;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_SERVICE_UUIDS16: u8 = 0x03;
pub const AD_TYPE_SERVICE_UUIDS128: u8 = 0x06;
pub const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
pub const AD_TYPE_SERVICE_DATA16: u8 = 0x16;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xff;

pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;

#[derive(Error, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisementDataError {
    #[error("Advertisement data too long")]
    TooLong,
}

/// Service UUID in wire (little-endian) byte order.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

/// One service-data entry offered for the scan response.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct ServiceDataEntry<'a> {
    pub uuid: Uuid,
    pub data: &'a [u8],
}

/// EIR/AD record buffer. Each record is `[1 + len][type][data]`; appends
/// that would overrun the capacity are refused, never truncated.
#[derive(Default, PartialEq, Clone, Debug)]
pub struct EirData<const N: usize = MAX_ADVERTISEMENT_LENGTH> {
    data: Vec<u8, N>,
}

impl<const N: usize> EirData<N> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn remaining(&self) -> usize {
        N - self.data.len()
    }

    pub fn append_record(
        &mut self,
        ad_type: u8,
        payload: &[u8],
    ) -> Result<(), AdvertisementDataError> {
        if payload.len() + 2 > self.remaining() || payload.len() > 254 {
            return Err(AdvertisementDataError::TooLong);
        }
        self.data.push((payload.len() + 1) as u8).unwrap();
        self.data.push(ad_type).unwrap();
        self.data.extend_from_slice(payload).unwrap();
        Ok(())
    }

    /// Service Data record: 16-bit UUID followed by the service payload.
    pub fn append_service_data(
        &mut self,
        uuid: u16,
        data: &[u8],
    ) -> Result<(), AdvertisementDataError> {
        if data.len() + 4 > self.remaining() || data.len() > 252 {
            return Err(AdvertisementDataError::TooLong);
        }
        self.data.push((data.len() + 3) as u8).unwrap();
        self.data.push(AD_TYPE_SERVICE_DATA16).unwrap();
        self.data.extend_from_slice(&uuid.to_le_bytes()).unwrap();
        self.data.extend_from_slice(data).unwrap();
        Ok(())
    }
}
