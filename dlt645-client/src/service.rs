//! Meter operations on top of the request engine

use crate::engine::RequestEngine;
use chrono::NaiveDateTime;
use dlt645_core::{Address, Category, DataIdentifier, DataItem, Dlt645Error, Dlt645Result};
use dlt645_protocol::{ControlCode, Frame, FrameCodec, Function, Payload};
use dlt645_transport::TransportLayer;

/// DLT/645 master talking to one meter
///
/// Every response is checked before its payload is used: it must be a response to the
/// function that was sent, it must come from the addressed meter, and it must not carry
/// the exception flag.
#[derive(Debug)]
pub struct MeterClient<T: TransportLayer> {
    engine: RequestEngine<T>,
    codec: FrameCodec,
    address: Address,
}

impl<T: TransportLayer> MeterClient<T> {
    pub fn new(engine: RequestEngine<T>, codec: FrameCodec, address: Address) -> Self {
        Self {
            engine,
            codec,
            address,
        }
    }

    /// Address requests are sent to
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn engine(&self) -> &RequestEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RequestEngine<T> {
        &mut self.engine
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub async fn connect(&mut self) -> Dlt645Result<()> {
        self.engine.connect().await
    }

    pub async fn close(&mut self) -> Dlt645Result<()> {
        self.engine.close().await
    }

    /// Read one data item
    ///
    /// # Errors
    /// - `UnknownIdentifier` if the identifier is not registered (nothing is sent)
    /// - `ExceptionResponse` if the meter rejects the request
    /// - `UnexpectedResponse` / `AddressMismatch` if the reply does not match the request
    /// - `ChecksumMismatch` if the reply is corrupted; this is not retried
    pub async fn read_data(&mut self, identifier: DataIdentifier) -> Dlt645Result<DataItem> {
        let definition = self.codec.registry().lookup(identifier)?.clone();
        let request = self
            .codec
            .serialize(self.address, ControlCode::READ_DATA, identifier, None)?;

        let frame = self.transact(&request, Function::ReadData, true).await?;
        if frame.identifier() != Some(identifier) {
            return Err(Dlt645Error::UnexpectedResponse(format!(
                "asked for {}, got {}",
                identifier, frame
            )));
        }

        match frame.into_payload() {
            Payload::Value(value) => {
                let item = DataItem::new(definition, value);
                log::info!("Meter {}: {}", self.address, item);
                Ok(item)
            }
            other => Err(Dlt645Error::UnexpectedResponse(format!(
                "no value for {}: {:?}",
                identifier, other
            ))),
        }
    }

    /// Read an energy item (`00xxxxxx`)
    pub async fn read_energy(&mut self, identifier: DataIdentifier) -> Dlt645Result<DataItem> {
        check_category(identifier, Category::Energy)?;
        self.read_data(identifier).await
    }

    /// Read a maximum demand item (`01xxxxxx`)
    pub async fn read_demand(&mut self, identifier: DataIdentifier) -> Dlt645Result<DataItem> {
        check_category(identifier, Category::Demand)?;
        self.read_data(identifier).await
    }

    /// Read an instantaneous variable (`02xxxxxx`)
    pub async fn read_variable(&mut self, identifier: DataIdentifier) -> Dlt645Result<DataItem> {
        check_category(identifier, Category::Variable)?;
        self.read_data(identifier).await
    }

    /// Ask the meter on the line for its address and use it for later requests
    ///
    /// The request goes to the broadcast address, so only one meter may be on the bus.
    pub async fn read_address(&mut self) -> Dlt645Result<Address> {
        let request = self.codec.encode(&Frame::read_address_request())?;
        let frame = self.transact(&request, Function::ReadAddress, false).await?;

        match frame.payload() {
            Payload::Address(address) => {
                log::info!("Meter reports address {}", address);
                self.address = *address;
                Ok(*address)
            }
            other => Err(Dlt645Error::UnexpectedResponse(format!(
                "read address response without address: {:?}",
                other
            ))),
        }
    }

    /// Program a new address into the meter and use it for later requests
    pub async fn write_address(&mut self, new_address: Address) -> Dlt645Result<()> {
        let request = self.codec.encode(&Frame::write_address_request(new_address))?;
        self.transact(&request, Function::WriteAddress, false).await?;

        log::info!("Meter address changed from {} to {}", self.address, new_address);
        self.address = new_address;
        Ok(())
    }

    /// Broadcast a time synchronisation; meters do not answer it
    pub async fn broadcast_time_sync(&mut self, time: NaiveDateTime) -> Dlt645Result<()> {
        let request = self.codec.encode(&Frame::time_sync(time))?;
        self.engine.send_only(&request).await?;
        log::info!("Broadcast time {}", time.format("%Y-%m-%d %H:%M:%S"));
        Ok(())
    }

    /// Broadcast the local wall clock
    pub async fn broadcast_time_sync_now(&mut self) -> Dlt645Result<()> {
        self.broadcast_time_sync(chrono::Local::now().naive_local()).await
    }

    async fn transact(
        &mut self,
        request: &[u8],
        function: Function,
        check_address: bool,
    ) -> Dlt645Result<Frame> {
        let response = self.engine.exchange(request).await?;
        let frame = self.codec.deserialize(&response)?;
        log::debug!("Response: {}", frame);

        if !frame.control().is_response() || frame.function() != function {
            return Err(Dlt645Error::UnexpectedResponse(format!(
                "expected {:?} response, got {}",
                function, frame
            )));
        }
        if check_address && !self.address.is_broadcast() && frame.address() != self.address {
            return Err(Dlt645Error::AddressMismatch {
                expected: self.address,
                actual: frame.address(),
            });
        }
        if let Payload::Exception(code) = frame.payload() {
            return Err(Dlt645Error::ExceptionResponse(*code));
        }
        Ok(frame)
    }
}

fn check_category(identifier: DataIdentifier, expected: Category) -> Dlt645Result<()> {
    match identifier.category() {
        Some(category) if category == expected => Ok(()),
        _ => Err(Dlt645Error::InvalidData(format!(
            "{} is not a {} identifier",
            identifier, expected
        ))),
    }
}
