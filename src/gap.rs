use heapless::{Deque, Vec};
use thiserror_no_std::Error;

#[cfg(not(feature = "defmt"))]
use log::{debug, trace};

#[cfg(feature = "defmt")]
use defmt::{debug, trace};

use crate::ad_structure::{
    AdvertisementDataError, EirData, ServiceDataEntry, Uuid, AD_TYPE_FLAGS,
    AD_TYPE_MANUFACTURER_DATA, AD_TYPE_SERVICE_UUIDS128, AD_TYPE_SERVICE_UUIDS16,
    AD_TYPE_SHORTENED_LOCAL_NAME, BR_EDR_NOT_SUPPORTED, LE_GENERAL_DISCOVERABLE,
    MAX_ADVERTISEMENT_LENGTH,
};
use crate::transport::Transport;
use crate::types::ControllerError;
use crate::{Hci, HciEvent};

const GAP_EVENT_QUEUE_SIZE: usize = 4;

/// Apple company identifier, leading the iBeacon manufacturer record.
const IBEACON_COMPANY_ID: u16 = 0x004c;
const IBEACON_TYPE: u8 = 0x02;

/// Working room for the iBeacon build; oversize results are rejected at
/// dispatch, not truncated.
const IBEACON_BUILD_MAX: usize = 64;

const ADVERTISEMENT_FLAGS: u8 = LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED;

/// Scan-response records stop once the running offset would reach this
/// margin; with the 4-byte record overhead it is exactly what keeps every
/// emitted record inside the 31-byte cap.
const SCAN_DATA_OFFSET_MARGIN: usize = 28;

#[derive(Error, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GapError {
    #[error("Advertisement data is over maximum limit of 31 bytes")]
    AdvertisementDataTooLong,
    #[error("Scan data is over maximum limit of 31 bytes")]
    ScanDataTooLong,
    #[error("{0}")]
    Controller(ControllerError),
    #[error("Unknown ({0})")]
    UnknownStatus(u8),
}

#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertiseState {
    Idle,
    Starting,
    Started,
    Stopping,
    Stopped,
}

#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GapEvent {
    AdvertisingStart(Option<GapError>),
    AdvertisingStop,
}

/// Advertising lifecycle controller on top of [`Hci`]. It never touches
/// raw transport frames; it issues link-layer commands and reacts to their
/// completions.
pub struct Gap {
    state: AdvertiseState,
    events: Deque<GapEvent, GAP_EVENT_QUEUE_SIZE>,
}

impl Default for Gap {
    fn default() -> Self {
        Self::new()
    }
}

impl Gap {
    pub fn new() -> Self {
        Self {
            state: AdvertiseState::Idle,
            events: Deque::new(),
        }
    }

    /// Build advertisement and scan-response payloads and start
    /// advertising them.
    pub fn start_advertising<T, F>(
        &mut self,
        hci: &mut Hci<T, F>,
        name: Option<&str>,
        service_uuids: &[Uuid],
        service_data: &[ServiceDataEntry<'_>],
    ) where
        T: Transport,
        F: Fn() -> u64,
    {
        debug!(
            "start advertising, {} service uuids, {} service data entries",
            service_uuids.len(),
            service_data.len()
        );
        let advertisement = build_advertisement(name, service_uuids);
        let scan_response = build_scan_response(service_data);
        self.start_advertising_with_eir_data(hci, advertisement.as_slice(), scan_response.as_slice());
    }

    /// Advertise an iBeacon frame; `data` must fit the manufacturer record
    /// (no truncation is applied).
    pub fn start_advertising_ibeacon<T, F>(&mut self, hci: &mut Hci<T, F>, data: &[u8])
    where
        T: Transport,
        F: Fn() -> u64,
    {
        debug!("start advertising ibeacon, {} payload bytes", data.len());
        match build_ibeacon_advertisement(data) {
            Ok(advertisement) => {
                self.start_advertising_with_eir_data(hci, advertisement.as_slice(), &[]);
            }
            Err(_) => {
                self.push_event(GapEvent::AdvertisingStart(Some(
                    GapError::AdvertisementDataTooLong,
                )));
            }
        }
    }

    /// Start advertising caller-supplied EIR payloads. Oversize payloads
    /// surface through [`GapEvent::AdvertisingStart`] without touching the
    /// transport; the data commands are (re)issued on every call while the
    /// enable sequence is guarded against duplicate starts.
    pub fn start_advertising_with_eir_data<T, F>(
        &mut self,
        hci: &mut Hci<T, F>,
        advertisement_data: &[u8],
        scan_data: &[u8],
    ) where
        T: Transport,
        F: Fn() -> u64,
    {
        let error = if advertisement_data.len() > MAX_ADVERTISEMENT_LENGTH {
            Some(GapError::AdvertisementDataTooLong)
        } else if scan_data.len() > MAX_ADVERTISEMENT_LENGTH {
            Some(GapError::ScanDataTooLong)
        } else {
            None
        };

        if let Some(error) = error {
            self.push_event(GapEvent::AdvertisingStart(Some(error)));
            return;
        }

        self.start_le_advertising(hci);
        hci.set_scan_response_data(scan_data);
        hci.set_advertising_data(advertisement_data);
    }

    fn start_le_advertising<T, F>(&mut self, hci: &mut Hci<T, F>)
    where
        T: Transport,
        F: Fn() -> u64,
    {
        if self.state != AdvertiseState::Starting && self.state != AdvertiseState::Started {
            self.state = AdvertiseState::Starting;
            hci.set_advertising_parameters();
            hci.set_advertise_enable(true);
        }
    }

    /// Unconditional: stopping does not cancel an in-flight start, the
    /// enable completion sorts out which transition fires.
    pub fn stop_advertising<T, F>(&mut self, hci: &mut Hci<T, F>)
    where
        T: Transport,
        F: Fn() -> u64,
    {
        self.state = AdvertiseState::Stopping;
        hci.set_advertise_enable(false);
    }

    /// Dispatch a link-layer notification into the lifecycle.
    pub fn on_hci_event(&mut self, event: &HciEvent) {
        match event {
            HciEvent::LeAdvertiseEnableSet { status } => self.on_advertise_enable_set(*status),
            // reserved hooks: accepted, no transition, no notification
            HciEvent::LeAdvertisingParametersSet { .. }
            | HciEvent::LeAdvertisingDataSet { .. }
            | HciEvent::LeScanResponseDataSet { .. } => {}
            _ => {}
        }
    }

    fn on_advertise_enable_set(&mut self, status: u8) {
        match self.state {
            AdvertiseState::Starting => {
                self.state = AdvertiseState::Started;
                self.push_event(GapEvent::AdvertisingStart(status_error(status)));
            }
            AdvertiseState::Stopping => {
                self.state = AdvertiseState::Stopped;
                self.push_event(GapEvent::AdvertisingStop);
            }
            _ => trace!("advertise enable completion outside start/stop, rejected"),
        }
    }

    /// Drain the next advertising notification.
    pub fn poll_event(&mut self) -> Option<GapEvent> {
        self.events.pop_front()
    }

    fn push_event(&mut self, event: GapEvent) {
        if self.events.push_back(event).is_err() {
            trace!("gap event queue full, dropping event");
        }
    }
}

fn status_error(status: u8) -> Option<GapError> {
    if status == 0 {
        return None;
    }
    Some(match ControllerError::try_from(status) {
        Ok(err) => GapError::Controller(err),
        Err(_) => GapError::UnknownStatus(status),
    })
}

fn build_advertisement(name: Option<&str>, service_uuids: &[Uuid]) -> EirData {
    let mut advertisement = EirData::new();
    advertisement
        .append_record(AD_TYPE_FLAGS, &[ADVERTISEMENT_FLAGS])
        .unwrap();

    let mut uuids16: Vec<u8, MAX_ADVERTISEMENT_LENGTH> = Vec::new();
    let mut uuids128: Vec<u8, MAX_ADVERTISEMENT_LENGTH> = Vec::new();
    for uuid in service_uuids {
        // entries beyond what a record can ever carry are dropped here
        match uuid {
            Uuid::Uuid16(uuid) => {
                let _ = uuids16.extend_from_slice(&uuid.to_le_bytes());
            }
            Uuid::Uuid128(bytes) => {
                let _ = uuids128.extend_from_slice(bytes);
            }
        }
    }

    append_uuid_list(&mut advertisement, AD_TYPE_SERVICE_UUIDS16, 2, &uuids16);
    append_uuid_list(&mut advertisement, AD_TYPE_SERVICE_UUIDS128, 16, &uuids128);

    if let Some(name) = name {
        // shortened name needs its 2-byte record header to fit
        let available = advertisement.remaining().saturating_sub(2);
        let len = name.len().min(available);
        if len > 0 {
            advertisement
                .append_record(AD_TYPE_SHORTENED_LOCAL_NAME, &name.as_bytes()[..len])
                .unwrap();
        }
    }

    advertisement
}

/// Emit a UUID list record holding as many whole entries as still fit;
/// omitted entirely when none do.
fn append_uuid_list(advertisement: &mut EirData, ad_type: u8, uuid_len: usize, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let available = advertisement.remaining().saturating_sub(2);
    let count = (bytes.len() / uuid_len).min(available / uuid_len);
    if count == 0 {
        return;
    }
    advertisement
        .append_record(ad_type, &bytes[..count * uuid_len])
        .unwrap();
}

fn build_scan_response(service_data: &[ServiceDataEntry<'_>]) -> EirData {
    let mut scan_response = EirData::new();
    for entry in service_data {
        let Uuid::Uuid16(uuid) = entry.uuid else {
            continue;
        };
        if entry.data.is_empty() {
            continue;
        }
        if entry.data.len() + scan_response.len() >= SCAN_DATA_OFFSET_MARGIN {
            continue;
        }
        scan_response
            .append_service_data(uuid, entry.data)
            .unwrap();
    }
    scan_response
}

fn build_ibeacon_advertisement(
    data: &[u8],
) -> Result<EirData<IBEACON_BUILD_MAX>, AdvertisementDataError> {
    let mut advertisement: EirData<IBEACON_BUILD_MAX> = EirData::new();
    advertisement.append_record(AD_TYPE_FLAGS, &[ADVERTISEMENT_FLAGS])?;

    let mut manufacturer_data: Vec<u8, IBEACON_BUILD_MAX> = Vec::new();
    manufacturer_data
        .extend_from_slice(&IBEACON_COMPANY_ID.to_le_bytes())
        .unwrap();
    manufacturer_data.push(IBEACON_TYPE).unwrap();
    manufacturer_data.push(data.len() as u8).unwrap();
    manufacturer_data
        .extend_from_slice(data)
        .map_err(|_| AdvertisementDataError::TooLong)?;
    advertisement.append_record(AD_TYPE_MANUFACTURER_DATA, &manufacturer_data)?;
    Ok(advertisement)
}
