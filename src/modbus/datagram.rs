//! Incremental Modbus RTU frame validation and reply synthesis.
//!
//! Every received byte advances a per-function-code state machine keyed
//! by its position in the frame. Field values are range-checked as they
//! complete; any violation parks the parser in an error state that later
//! turns into a standard exception reply. Frames addressed to another
//! device are ignored outright.

use byte::{BytesExt, BE};
use heapless::Vec;

use super::crc::Crc;

/// Fixed frame buffer capacity. Larger than any supported request.
pub const FRAME_CAPACITY: usize = 32;

/// Modbus exception codes carried in error replies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
}

/// Frame classification reported to the protocol FSM.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    GoodFrame,
    NotForMe,
    BadCrc,
}

/// Supported function codes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Function {
    ReadDiscreteInputs,
    ReadInputRegisters,
    WriteSingleRegister,
    WriteMultipleCoils,
    /// Vendor function: write the LED word and read the switch status in
    /// one exchange.
    WriteLedsReadSwitches,
}

impl Function {
    pub const fn code(self) -> u8 {
        match self {
            Function::ReadDiscreteInputs => 0x02,
            Function::ReadInputRegisters => 0x04,
            Function::WriteSingleRegister => 0x06,
            Function::WriteMultipleCoils => 0x0F,
            Function::WriteLedsReadSwitches => 0x41,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Function::ReadDiscreteInputs),
            0x04 => Some(Function::ReadInputRegisters),
            0x06 => Some(Function::WriteSingleRegister),
            0x0F => Some(Function::WriteMultipleCoils),
            0x41 => Some(Function::WriteLedsReadSwitches),
            _ => None,
        }
    }
}

/// Inclusive range check for one request field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bounds {
    pub min: u16,
    pub max: u16,
}

impl Bounds {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub const fn exactly(value: u16) -> Self {
        Self::new(value, value)
    }

    pub const fn contains(&self, value: u16) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Device address plus per-function field bounds, resolved once at
/// startup. Defaults mirror the console device profile.
#[derive(Clone, Copy, Debug)]
pub struct DatagramConfig {
    pub address: u8,
    pub discrete_inputs_start: Bounds,
    pub discrete_inputs_qty: Bounds,
    pub input_registers_start: Bounds,
    pub input_registers_qty: Bounds,
    pub holding_register_addr: Bounds,
    pub holding_register_value: Bounds,
    pub coils_start: Bounds,
    pub coils_qty: Bounds,
}

impl DatagramConfig {
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            discrete_inputs_start: Bounds::exactly(0),
            discrete_inputs_qty: Bounds::exactly(4),
            input_registers_start: Bounds::exactly(0),
            input_registers_qty: Bounds::exactly(1),
            holding_register_addr: Bounds::exactly(1),
            holding_register_value: Bounds::exactly(1),
            coils_start: Bounds::exactly(0),
            coils_qty: Bounds::exactly(16),
        }
    }

    pub const fn discrete_inputs(mut self, start: Bounds, qty: Bounds) -> Self {
        self.discrete_inputs_start = start;
        self.discrete_inputs_qty = qty;
        self
    }

    pub const fn input_registers(mut self, start: Bounds, qty: Bounds) -> Self {
        self.input_registers_start = start;
        self.input_registers_qty = qty;
        self
    }

    pub const fn holding_register(mut self, addr: Bounds, value: Bounds) -> Self {
        self.holding_register_addr = addr;
        self.holding_register_value = value;
        self
    }

    pub const fn coils(mut self, start: Bounds, qty: Bounds) -> Self {
        self.coils_start = start;
        self.coils_qty = qty;
        self
    }
}

/// Application callbacks invoked on frame completion, one per supported
/// function code. Each receives the decoded request fields and populates
/// the reply through [`Reply`]; packing nothing echoes the received frame
/// back unchanged.
pub trait Callbacks {
    fn read_discrete_inputs(&mut self, reply: &mut Reply<'_>, start: u16, qty: u16);
    fn read_input_registers(&mut self, reply: &mut Reply<'_>, start: u16, qty: u16);
    fn write_single_register(&mut self, reply: &mut Reply<'_>, addr: u16, value: u16);
    fn write_multiple_coils(&mut self, reply: &mut Reply<'_>, start: u16, qty: u16, values: &[u8]);
    fn write_leds_read_switches(&mut self, reply: &mut Reply<'_>, leds: u16);
}

/// Big-endian reply field. Implemented for the 1/2/4-byte integers the
/// wire format carries.
pub trait Pack {
    fn pack(self, reply: &mut Reply<'_>);
}

impl Pack for u8 {
    fn pack(self, reply: &mut Reply<'_>) {
        reply.push(self);
    }
}

impl Pack for u16 {
    fn pack(self, reply: &mut Reply<'_>) {
        let mut raw = [0u8; 2];
        let _ = (&mut raw[..]).write_with(&mut 0, self, BE);
        reply.extend(&raw);
    }
}

impl Pack for u32 {
    fn pack(self, reply: &mut Reply<'_>) {
        let mut raw = [0u8; 4];
        let _ = (&mut raw[..]).write_with(&mut 0, self, BE);
        reply.extend(&raw);
    }
}

/// Reply writer handed to the application callbacks.
///
/// The first `pack` drops the received payload and starts appending after
/// the echoed address and function code; `error` requests an exception
/// reply instead.
pub struct Reply<'a> {
    buffer: &'a mut Vec<u8, FRAME_CAPACITY>,
    touched: bool,
    error: Option<Exception>,
}

impl<'a> Reply<'a> {
    fn new(buffer: &'a mut Vec<u8, FRAME_CAPACITY>) -> Self {
        Self {
            buffer,
            touched: false,
            error: None,
        }
    }

    /// Append a big-endian value to the reply payload.
    pub fn pack<T: Pack>(&mut self, value: T) {
        value.pack(self);
    }

    /// Turn the reply into a Modbus exception reply.
    pub fn error(&mut self, code: Exception) {
        self.error = Some(code);
    }

    fn begin(&mut self) {
        if !self.touched {
            // Keep the echoed address and function code only.
            self.buffer.truncate(2);
            self.touched = true;
        }
    }

    fn push(&mut self, byte: u8) {
        self.begin();
        self.buffer
            .push(byte)
            .expect("modbus: reply exceeds frame capacity");
    }

    fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ParseState {
    /// Frame is for another device; all further bytes are dropped.
    Ignore,
    /// Field validation failed; keep the CRC running for the exception
    /// reply but stop storing.
    Error,
    Address,
    FunctionCode,
    Body(Function),
    Ready(Function),
}

/// One Modbus frame, parsed incrementally.
pub struct Datagram<C: Callbacks> {
    config: DatagramConfig,
    callbacks: C,
    buffer: Vec<u8, FRAME_CAPACITY>,
    crc: Crc,
    state: ParseState,
    error: Option<Exception>,
    coil_bytes: u8,
}

impl<C: Callbacks> Datagram<C> {
    pub fn new(config: DatagramConfig, callbacks: C) -> Self {
        Self {
            config,
            callbacks,
            buffer: Vec::new(),
            crc: Crc::new(),
            state: ParseState::Address,
            error: None,
            coil_bytes: 0,
        }
    }

    /// Discard any partial frame; called when the bus goes idle.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.crc.reset();
        self.state = ParseState::Address;
        self.error = None;
        self.coil_bytes = 0;
    }

    /// Classification of the frame received so far.
    pub fn get_status(&self) -> Status {
        if self.state == ParseState::Ignore {
            return Status::NotForMe;
        }

        if self.crc.check() {
            Status::GoodFrame
        } else {
            Status::BadCrc
        }
    }

    /// The reply frame built by [`Datagram::ready_reply`], or the raw
    /// received bytes before that.
    pub fn get_buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn exception(&self) -> Option<Exception> {
        self.error
    }

    pub fn callbacks(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Feed one received byte.
    pub fn process_char(&mut self, c: u8) {
        if self.state == ParseState::Ignore {
            return;
        }

        self.crc.feed(c);

        if self.state != ParseState::Error {
            if self.buffer.push(c).is_err() {
                // Receive overflow: drop the whole frame.
                warn!("datagram: frame buffer overflow");
                self.state = ParseState::Ignore;
                return;
            }
        }

        match self.state {
            ParseState::Ignore | ParseState::Error => {}
            ParseState::Address => {
                if c == self.config.address {
                    self.state = ParseState::FunctionCode;
                } else {
                    self.state = ParseState::Ignore;
                }
            }
            ParseState::FunctionCode => match Function::from_code(c) {
                Some(function) => self.state = ParseState::Body(function),
                None => self.fail(Exception::IllegalFunction),
            },
            ParseState::Body(function) => self.advance_body(function, c),
            ParseState::Ready(_) => {
                // Trailing bytes after a complete frame.
                self.fail(Exception::IllegalDataValue);
            }
        }
    }

    /// Build the reply in place. Called once the inter-frame silence has
    /// confirmed a CRC-valid, addressed frame.
    pub fn ready_reply(&mut self) {
        match self.state {
            ParseState::Ignore => {}
            ParseState::Ready(function) => self.dispatch(function),
            ParseState::Error => {
                let code = self.error.unwrap_or(Exception::IllegalDataValue);
                self.build_exception(code);
            }
            _ => {
                // Frame ended before its expected byte count.
                self.build_exception(Exception::IllegalDataValue);
            }
        }
    }

    fn dispatch(&mut self, function: Function) {
        let Self {
            buffer, callbacks, ..
        } = self;

        let mut reply = Reply::new(buffer);

        match function {
            Function::ReadDiscreteInputs => {
                let start = word_at(reply.buffer, 2);
                let qty = word_at(reply.buffer, 4);
                callbacks.read_discrete_inputs(&mut reply, start, qty);
            }
            Function::ReadInputRegisters => {
                let start = word_at(reply.buffer, 2);
                let qty = word_at(reply.buffer, 4);
                callbacks.read_input_registers(&mut reply, start, qty);
            }
            Function::WriteSingleRegister => {
                let addr = word_at(reply.buffer, 2);
                let value = word_at(reply.buffer, 4);
                callbacks.write_single_register(&mut reply, addr, value);
            }
            Function::WriteMultipleCoils => {
                let start = word_at(reply.buffer, 2);
                let qty = word_at(reply.buffer, 4);
                let mut values: Vec<u8, FRAME_CAPACITY> = Vec::new();
                let _ = values.extend_from_slice(&reply.buffer[7..7 + self.coil_bytes as usize]);
                callbacks.write_multiple_coils(&mut reply, start, qty, &values);
            }
            Function::WriteLedsReadSwitches => {
                let leds = word_at(reply.buffer, 2);
                callbacks.write_leds_read_switches(&mut reply, leds);
            }
        }

        let touched = reply.touched;
        let error = reply.error;

        if let Some(code) = error {
            self.build_exception(code);
        } else if touched {
            self.append_crc();
        }
        // Untouched: the received frame, including its still-valid CRC,
        // is echoed back as is.
    }

    fn advance_body(&mut self, function: Function, c: u8) {
        let cnt = self.buffer.len();

        match function {
            Function::ReadDiscreteInputs => self.advance_fixed(
                function,
                cnt,
                self.config.discrete_inputs_start,
                self.config.discrete_inputs_qty,
            ),
            Function::ReadInputRegisters => self.advance_fixed(
                function,
                cnt,
                self.config.input_registers_start,
                self.config.input_registers_qty,
            ),
            Function::WriteSingleRegister => self.advance_fixed(
                function,
                cnt,
                self.config.holding_register_addr,
                self.config.holding_register_value,
            ),
            Function::WriteMultipleCoils => {
                if cnt == 4 {
                    let start = word_at(&self.buffer, 2);
                    if !self.config.coils_start.contains(start) {
                        self.fail(Exception::IllegalDataAddress);
                    }
                } else if cnt == 6 {
                    let qty = word_at(&self.buffer, 4);
                    if !self.config.coils_qty.contains(qty) {
                        self.fail(Exception::IllegalDataValue);
                    }
                } else if cnt == 7 {
                    // Widen before rounding up: a quantity near u16::MAX
                    // must not wrap into a plausible byte count.
                    let qty = word_at(&self.buffer, 4) as u32;
                    let expected = (qty + 7) / 8;
                    if u32::from(c) == expected {
                        self.coil_bytes = c;
                    } else {
                        self.fail(Exception::IllegalDataValue);
                    }
                } else if cnt == 9 + self.coil_bytes as usize {
                    self.state = ParseState::Ready(function);
                }
            }
            Function::WriteLedsReadSwitches => {
                if cnt == 6 {
                    self.state = ParseState::Ready(function);
                }
            }
        }
    }

    /// Common layout of the fixed 8-byte requests: a word validated at
    /// byte 4 (an address, against `first`), a word validated at byte 6
    /// (a quantity or value, against `second`), then the CRC.
    fn advance_fixed(&mut self, function: Function, cnt: usize, first: Bounds, second: Bounds) {
        if cnt == 4 {
            let value = word_at(&self.buffer, 2);
            if !first.contains(value) {
                self.fail(Exception::IllegalDataAddress);
            }
        } else if cnt == 6 {
            let value = word_at(&self.buffer, 4);
            if !second.contains(value) {
                self.fail(Exception::IllegalDataValue);
            }
        } else if cnt == 8 {
            self.state = ParseState::Ready(function);
        }
    }

    fn fail(&mut self, code: Exception) {
        self.error = Some(code);
        self.state = ParseState::Error;
    }

    fn build_exception(&mut self, code: Exception) {
        let addr = self.buffer.first().copied().unwrap_or(self.config.address);
        let function = self.buffer.get(1).copied().unwrap_or(0);

        self.buffer.clear();
        let _ = self.buffer.push(addr);
        let _ = self.buffer.push(function | 0x80);
        let _ = self.buffer.push(code as u8);
        self.append_crc();
    }

    fn append_crc(&mut self) {
        let crc = Crc::checksum(&self.buffer);
        let _ = self.buffer.push(crc as u8); // low byte first
        let _ = self.buffer.push((crc >> 8) as u8);
    }
}

fn word_at(buffer: &[u8], offset: usize) -> u16 {
    buffer.read_with(&mut { offset }, BE).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: u8 = 0x25;

    #[derive(Default)]
    struct Console {
        switches: u8,
        leds: u16,
        active_key: u16,
        beeps: usize,
    }

    impl Callbacks for Console {
        fn read_discrete_inputs(&mut self, reply: &mut Reply<'_>, _start: u16, _qty: u16) {
            reply.pack(1u8); // byte count
            reply.pack(self.switches);
        }

        fn read_input_registers(&mut self, reply: &mut Reply<'_>, _start: u16, _qty: u16) {
            reply.pack(2u8);
            reply.pack(self.active_key);
        }

        fn write_single_register(&mut self, _reply: &mut Reply<'_>, _addr: u16, _value: u16) {
            // Echo fast-path: no buffer changes.
            self.beeps += 1;
        }

        fn write_multiple_coils(&mut self, reply: &mut Reply<'_>, start: u16, qty: u16, values: &[u8]) {
            self.leds = u16::from_be_bytes([values[0], values[1]]);
            reply.pack(start);
            reply.pack(qty);
        }

        fn write_leds_read_switches(&mut self, reply: &mut Reply<'_>, leds: u16) {
            self.leds = leds;
            reply.pack(1u8);
            reply.pack(self.switches);
        }
    }

    fn datagram() -> Datagram<Console> {
        Datagram::new(DatagramConfig::new(ADDRESS), Console::default())
    }

    fn feed_frame<C: Callbacks>(dgram: &mut Datagram<C>, payload: &[u8]) {
        let crc = Crc::checksum(payload);
        for &byte in payload {
            dgram.process_char(byte);
        }
        dgram.process_char(crc as u8);
        dgram.process_char((crc >> 8) as u8);
    }

    fn reply_crc_is_valid(frame: &[u8]) -> bool {
        let (payload, crc) = frame.split_at(frame.len() - 2);
        let expected = Crc::checksum(payload);
        crc == [expected as u8, (expected >> 8) as u8]
    }

    #[test]
    fn wrong_address_suppresses_all_further_processing() {
        let mut dgram = datagram();
        feed_frame(&mut dgram, &[ADDRESS + 1, 0x02, 0x00, 0x00, 0x00, 0x04]);

        assert_eq!(dgram.get_status(), Status::NotForMe);

        // Subsequent garbage must not change the classification.
        dgram.process_char(0xFF);
        dgram.process_char(ADDRESS);
        assert_eq!(dgram.get_status(), Status::NotForMe);
        assert!(dgram.get_buffer().is_empty());
    }

    #[test]
    fn read_discrete_inputs_builds_a_six_byte_reply() {
        let mut dgram = datagram();
        dgram.callbacks().switches = 0b1010;

        feed_frame(&mut dgram, &[ADDRESS, 0x02, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(dgram.get_status(), Status::GoodFrame);

        dgram.ready_reply();
        let reply = dgram.get_buffer();

        assert_eq!(reply.len(), 6);
        assert_eq!(&reply[..4], &[ADDRESS, 0x02, 0x01, 0b1010]);
        assert!(reply_crc_is_valid(reply));
    }

    #[test]
    fn corrupted_crc_is_reported() {
        let mut dgram = datagram();
        let payload = [ADDRESS, 0x02, 0x00, 0x00, 0x00, 0x04];
        let crc = Crc::checksum(&payload);
        for &byte in &payload {
            dgram.process_char(byte);
        }
        dgram.process_char(crc as u8 ^ 0xFF);
        dgram.process_char((crc >> 8) as u8);

        assert_eq!(dgram.get_status(), Status::BadCrc);
    }

    #[test]
    fn unknown_function_code_yields_an_exception_reply() {
        let mut dgram = datagram();
        feed_frame(&mut dgram, &[ADDRESS, 0x63, 0x00, 0x00]);

        assert_eq!(dgram.get_status(), Status::GoodFrame);
        dgram.ready_reply();

        let reply = dgram.get_buffer();
        assert_eq!(&reply[..3], &[ADDRESS, 0x63 | 0x80, 0x01]);
        assert!(reply_crc_is_valid(reply));
    }

    #[test]
    fn out_of_range_start_maps_to_illegal_data_address() {
        let mut dgram = datagram();
        feed_frame(&mut dgram, &[ADDRESS, 0x02, 0x00, 0x01, 0x00, 0x04]);

        assert_eq!(dgram.exception(), Some(Exception::IllegalDataAddress));
        dgram.ready_reply();
        assert_eq!(&dgram.get_buffer()[..3], &[ADDRESS, 0x82, 0x02]);
    }

    #[test]
    fn out_of_range_quantity_maps_to_illegal_data_value() {
        let mut dgram = datagram();
        feed_frame(&mut dgram, &[ADDRESS, 0x02, 0x00, 0x00, 0x00, 0x05]);

        assert_eq!(dgram.exception(), Some(Exception::IllegalDataValue));
        dgram.ready_reply();
        assert_eq!(&dgram.get_buffer()[..3], &[ADDRESS, 0x82, 0x03]);
    }

    #[test]
    fn write_multiple_coils_decodes_the_coil_bytes() {
        let mut dgram = datagram();
        feed_frame(
            &mut dgram,
            &[ADDRESS, 0x0F, 0x00, 0x00, 0x00, 0x10, 0x02, 0xBE, 0xEF],
        );

        assert_eq!(dgram.get_status(), Status::GoodFrame);
        dgram.ready_reply();

        assert_eq!(dgram.callbacks().leds, 0xBEEF);
        let reply = dgram.get_buffer();
        assert_eq!(&reply[..6], &[ADDRESS, 0x0F, 0x00, 0x00, 0x00, 0x10]);
        assert!(reply_crc_is_valid(reply));
    }

    #[test]
    fn mismatched_byte_count_is_rejected() {
        let mut dgram = datagram();
        feed_frame(
            &mut dgram,
            &[ADDRESS, 0x0F, 0x00, 0x00, 0x00, 0x10, 0x03, 0xBE, 0xEF, 0x00],
        );

        assert_eq!(dgram.exception(), Some(Exception::IllegalDataValue));
    }

    #[test]
    fn coil_quantity_near_the_word_limit_is_rejected() {
        let config =
            DatagramConfig::new(ADDRESS).coils(Bounds::exactly(0), Bounds::new(1, u16::MAX));
        let mut dgram = Datagram::new(config, Console::default());

        // 0xFFFA coils would need 8192 data bytes; no one-byte count can
        // announce that many, whatever the count byte says.
        for &byte in &[ADDRESS, 0x0F, 0x00, 0x00, 0xFF, 0xFA, 0x00] {
            dgram.process_char(byte);
        }

        assert_eq!(dgram.exception(), Some(Exception::IllegalDataValue));
    }

    #[test]
    fn frame_longer_than_the_buffer_is_dropped() {
        let config =
            DatagramConfig::new(ADDRESS).coils(Bounds::exactly(0), Bounds::new(1, 200));
        let mut dgram = Datagram::new(config, Console::default());

        // 200 coils need 25 data bytes: 34 bytes on the wire, past the
        // buffer capacity.
        for &byte in &[ADDRESS, 0x0F, 0x00, 0x00, 0x00, 0xC8, 0x19] {
            dgram.process_char(byte);
        }
        for _ in 0..FRAME_CAPACITY {
            dgram.process_char(0xAA);
        }

        assert_eq!(dgram.get_status(), Status::NotForMe);
        assert_eq!(dgram.get_buffer().len(), FRAME_CAPACITY);

        // Once dropped, further bytes change nothing.
        dgram.process_char(0x55);
        assert_eq!(dgram.get_buffer().len(), FRAME_CAPACITY);
        assert_eq!(dgram.get_status(), Status::NotForMe);
    }

    #[test]
    fn untouched_reply_echoes_the_received_frame() {
        let mut dgram = datagram();
        let mut wire: std::vec::Vec<u8> = vec![ADDRESS, 0x06, 0x00, 0x01, 0x00, 0x01];
        let crc = Crc::checksum(&wire);
        wire.push(crc as u8);
        wire.push((crc >> 8) as u8);

        for &byte in &wire {
            dgram.process_char(byte);
        }
        dgram.ready_reply();

        assert_eq!(dgram.callbacks().beeps, 1);
        assert_eq!(dgram.get_buffer(), &wire[..]);
    }

    #[test]
    fn callback_signalled_error_becomes_an_exception_reply() {
        struct Failing;
        impl Callbacks for Failing {
            fn read_discrete_inputs(&mut self, reply: &mut Reply<'_>, _: u16, _: u16) {
                reply.error(Exception::IllegalDataAddress);
            }
            fn read_input_registers(&mut self, _: &mut Reply<'_>, _: u16, _: u16) {}
            fn write_single_register(&mut self, _: &mut Reply<'_>, _: u16, _: u16) {}
            fn write_multiple_coils(&mut self, _: &mut Reply<'_>, _: u16, _: u16, _: &[u8]) {}
            fn write_leds_read_switches(&mut self, _: &mut Reply<'_>, _: u16) {}
        }

        let mut dgram = Datagram::new(DatagramConfig::new(ADDRESS), Failing);
        feed_frame(&mut dgram, &[ADDRESS, 0x02, 0x00, 0x00, 0x00, 0x04]);
        dgram.ready_reply();

        let reply = dgram.get_buffer();
        assert_eq!(&reply[..3], &[ADDRESS, 0x82, 0x02]);
        assert!(reply_crc_is_valid(reply));
    }

    #[test]
    fn vendor_function_combines_led_write_and_status_read() {
        let mut dgram = datagram();
        dgram.callbacks().switches = 0x0F;

        feed_frame(&mut dgram, &[ADDRESS, 0x41, 0x12, 0x34]);
        assert_eq!(dgram.get_status(), Status::GoodFrame);
        dgram.ready_reply();

        assert_eq!(dgram.callbacks().leds, 0x1234);
        let reply = dgram.get_buffer();
        assert_eq!(&reply[..4], &[ADDRESS, 0x41, 0x01, 0x0F]);
        assert!(reply_crc_is_valid(reply));
    }

    #[test]
    fn incomplete_frame_degrades_to_illegal_data_value() {
        let mut dgram = datagram();
        // Only the first four bytes of a read request, then silence.
        for &byte in &[ADDRESS, 0x02, 0x00, 0x00] {
            dgram.process_char(byte);
        }

        dgram.ready_reply();
        assert_eq!(&dgram.get_buffer()[..3], &[ADDRESS, 0x82, 0x03]);
    }

    #[test]
    fn reset_discards_a_partial_frame() {
        let mut dgram = datagram();
        dgram.process_char(ADDRESS);
        dgram.process_char(0x02);

        dgram.reset();
        assert!(dgram.get_buffer().is_empty());

        feed_frame(&mut dgram, &[ADDRESS, 0x02, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(dgram.get_status(), Status::GoodFrame);
    }
}
