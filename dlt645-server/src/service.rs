//! A handler that behaves like a simple meter
//!
//! Holds a device address and a table of readings. Answers read data, read address
//! and write address requests, and takes broadcast time synchronisation silently unless
//! told to acknowledge it.

use crate::handler::RequestHandler;
use chrono::NaiveDateTime;
use dlt645_core::{Address, DataIdentifier, Dlt645Result, ErrorCode, Value};
use dlt645_protocol::{Frame, FrameCodec, Function, Payload};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct MeterState {
    address: Address,
    values: HashMap<DataIdentifier, Value>,
    last_time_sync: Option<NaiveDateTime>,
}

/// Simulated meter
///
/// Shared between connections by the server; all state is behind one lock.
#[derive(Debug)]
pub struct MeterService {
    codec: FrameCodec,
    state: RwLock<MeterState>,
    acknowledge_time_sync: bool,
}

impl MeterService {
    pub fn new(codec: FrameCodec, address: Address) -> Self {
        Self {
            codec,
            state: RwLock::new(MeterState {
                address,
                values: HashMap::new(),
                last_time_sync: None,
            }),
            acknowledge_time_sync: false,
        }
    }

    /// Echo broadcast time synchronisation back as a response frame
    ///
    /// Off by default. Some masters wait for this echo even though the request is a
    /// broadcast; only enable it with a single meter on the line.
    pub fn with_time_sync_ack(mut self, acknowledge: bool) -> Self {
        self.acknowledge_time_sync = acknowledge;
        self
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn address(&self) -> Address {
        self.read_state().address
    }

    pub fn set_address(&self, address: Address) {
        self.write_state().address = address;
        log::info!("Meter address set to {}", address);
    }

    /// Store a reading
    ///
    /// # Errors
    /// - `UnknownIdentifier` if the identifier is not registered
    /// - `InvalidData` if the value kind does not match the identifier's category
    /// - `ValueOutOfRange` if the value does not fit the identifier's format
    pub fn set_value(&self, identifier: DataIdentifier, value: Value) -> Dlt645Result<()> {
        let definition = self.codec.registry().lookup(identifier)?;
        definition.encode_value(&value)?;
        log::debug!("{} ({}) = {}", identifier, definition.name(), value);
        self.write_state().values.insert(identifier, value);
        Ok(())
    }

    pub fn value(&self, identifier: DataIdentifier) -> Option<Value> {
        self.read_state().values.get(&identifier).cloned()
    }

    /// Time of the last broadcast time synchronisation received
    pub fn last_time_sync(&self) -> Option<NaiveDateTime> {
        self.read_state().last_time_sync
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MeterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MeterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_data(&self, own: Address, request: &Frame) -> Frame {
        let value = request
            .identifier()
            .and_then(|identifier| Some((identifier, self.value(identifier)?)));

        match value {
            Some((identifier, value)) => Frame::read_response(own, identifier, value),
            None => {
                log::debug!("No data for {}", request);
                Frame::exception(own, Function::ReadData, ErrorCode::NO_REQUESTED_DATA)
            }
        }
    }

    fn write_address(&self, own: Address, request: &Frame) -> Frame {
        match request.payload() {
            Payload::Address(new_address) => {
                self.set_address(*new_address);
                Frame::acknowledge(*new_address, request.control())
            }
            _ => Frame::exception(own, Function::WriteAddress, ErrorCode::OTHER),
        }
    }
}

impl RequestHandler for MeterService {
    fn handle_request(&self, request: &Frame) -> Dlt645Result<Option<Vec<u8>>> {
        if request.control().is_response() {
            log::debug!("Ignoring response frame {}", request);
            return Ok(None);
        }

        let own = self.address();
        if request.address() != own && !request.address().is_broadcast() {
            log::debug!("Ignoring frame for {}", request.address());
            return Ok(None);
        }

        let response = match request.function() {
            Function::ReadData => self.read_data(own, request),
            Function::ReadAddress => Frame::read_address_response(own),
            Function::WriteAddress => self.write_address(own, request),
            Function::BroadcastTimeSync => {
                let Payload::Time(time) = request.payload() else {
                    return Ok(None);
                };
                log::info!("Time synchronised to {}", time.format("%Y-%m-%d %H:%M:%S"));
                self.write_state().last_time_sync = Some(*time);
                if !self.acknowledge_time_sync {
                    return Ok(None);
                }
                Frame::new(
                    request.address(),
                    request.control().response(),
                    None,
                    Payload::Time(*time),
                )
            }
            function => {
                log::warn!("Unsupported function {:?}", function);
                Frame::exception(own, function, ErrorCode::OTHER)
            }
        };

        self.codec.encode(&response).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dlt645_core::config::default_registry;
    use dlt645_core::{Dlt645Error, FixedPoint};
    use dlt645_protocol::ControlCode;
    use std::sync::Arc;

    const ENERGY: DataIdentifier = DataIdentifier::new(0x0001_0000);
    const VOLTAGE: DataIdentifier = DataIdentifier::new(0x0201_0100);
    const DEMAND: DataIdentifier = DataIdentifier::new(0x0101_0000);

    fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(default_registry().unwrap()))
    }

    fn meter() -> Address {
        "000000000001".parse().unwrap()
    }

    fn service() -> MeterService {
        MeterService::new(codec(), meter())
    }

    /// Run a request through the service and decode the answer
    fn ask(service: &MeterService, request: Frame) -> Option<Frame> {
        let response = service.handle_request(&request).unwrap()?;
        Some(codec().deserialize(&response).unwrap())
    }

    #[test]
    fn test_read_stored_value() {
        let service = service();
        let value = Value::Number(FixedPoint::new(12_345_678, 2));
        service.set_value(ENERGY, value.clone()).unwrap();

        let response = ask(&service, Frame::read_request(meter(), ENERGY)).unwrap();
        assert_eq!(response.control(), ControlCode::READ_DATA.response());
        assert_eq!(response.identifier(), Some(ENERGY));
        assert_eq!(response.value(), Some(&value));
    }

    #[test]
    fn test_read_demand_with_time() {
        let service = service();
        let value = Value::Demand {
            value: FixedPoint::new(15_000, 4),
            occurred_at: NaiveDate::from_ymd_opt(2024, 5, 6)
                .unwrap()
                .and_hms_opt(7, 8, 0)
                .unwrap(),
        };
        service.set_value(DEMAND, value.clone()).unwrap();

        let response = ask(&service, Frame::read_request(meter(), DEMAND)).unwrap();
        assert_eq!(response.value(), Some(&value));
    }

    #[test]
    fn test_missing_data_is_an_exception() {
        let service = service();
        for identifier in [VOLTAGE, DataIdentifier::new(0x0201_FF00)] {
            let response = ask(&service, Frame::read_request(meter(), identifier)).unwrap();
            assert_eq!(response.control().value(), 0xD1);
            assert_eq!(
                response.payload(),
                &Payload::Exception(ErrorCode::NO_REQUESTED_DATA)
            );
        }
    }

    #[test]
    fn test_set_value_validation() {
        let service = service();
        assert!(matches!(
            service.set_value(ENERGY, Value::Number(FixedPoint::new(100_000_000, 2))),
            Err(Dlt645Error::ValueOutOfRange(_))
        ));
        assert!(matches!(
            service.set_value(VOLTAGE, Value::Number(FixedPoint::new(-2200, 1))),
            Err(Dlt645Error::ValueOutOfRange(_))
        ));
        assert!(matches!(
            service.set_value(ENERGY, Value::Demand {
                value: FixedPoint::new(1, 4),
                occurred_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            }),
            Err(Dlt645Error::InvalidData(_))
        ));
        assert!(matches!(
            service.set_value(DataIdentifier::new(0x0201_FF00), Value::Number(FixedPoint::new(1, 0))),
            Err(Dlt645Error::UnknownIdentifier(_))
        ));
        assert!(matches!(
            service.set_value(ENERGY, Value::Number(FixedPoint::new(1, 25))),
            Err(Dlt645Error::ValueOutOfRange(_))
        ));
        assert!(service.value(ENERGY).is_none());
    }

    #[test]
    fn test_foreign_and_response_frames_ignored() {
        let service = service();
        service
            .set_value(ENERGY, Value::Number(FixedPoint::new(1, 2)))
            .unwrap();

        let other: Address = "000000000002".parse().unwrap();
        assert!(ask(&service, Frame::read_request(other, ENERGY)).is_none());
        assert!(ask(&service, Frame::read_address_response(meter())).is_none());
    }

    #[test]
    fn test_read_and_write_address() {
        let service = service();
        let response = ask(&service, Frame::read_address_request()).unwrap();
        assert_eq!(response.payload(), &Payload::Address(meter()));
        assert_eq!(response.address(), meter());

        let new_address: Address = "000000000042".parse().unwrap();
        let response = ask(&service, Frame::write_address_request(new_address)).unwrap();
        assert_eq!(response.control(), ControlCode::WRITE_ADDRESS.response());
        assert_eq!(service.address(), new_address);

        // the old address is no longer ours
        assert!(ask(&service, Frame::read_request(meter(), ENERGY)).is_none());
    }

    #[test]
    fn test_time_sync_has_no_reply() {
        let service = service();
        let time = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        assert!(ask(&service, Frame::time_sync(time)).is_none());
        assert_eq!(service.last_time_sync(), Some(time));
    }

    #[test]
    fn test_time_sync_echo_when_enabled() {
        let service = service().with_time_sync_ack(true);
        let time = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();

        let response = ask(&service, Frame::time_sync(time)).unwrap();
        assert_eq!(response.address(), Address::TIME_SYNC);
        assert_eq!(response.control(), ControlCode::BROADCAST_TIME_SYNC.response());
        assert_eq!(response.payload(), &Payload::Time(time));
        assert_eq!(service.last_time_sync(), Some(time));
    }

    #[test]
    fn test_unsupported_function() {
        let service = service();
        let request = Frame::new(meter(), ControlCode::FREEZE, None, Payload::Empty);
        let response = ask(&service, request).unwrap();
        assert!(response.control().is_exception());
        assert_eq!(response.function(), Function::Freeze);
        assert_eq!(response.payload(), &Payload::Exception(ErrorCode::OTHER));
    }
}
