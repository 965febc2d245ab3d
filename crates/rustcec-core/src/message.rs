use crate::encoding::{reader::Reader, writer::Writer};
use crate::types::{
    AbortReason, DeviceType, LogicalAddress, Opcode, PhysicalAddress, PowerStatus, VendorId,
};
use crate::{DecodeError, EncodeError};
use core::fmt;

/// Maximum operand bytes in one CEC frame.
pub const MAX_PARAMS: usize = 14;
/// Header + opcode + operands.
pub const MAX_FRAME_LEN: usize = 2 + MAX_PARAMS;

/// A single CEC frame.
///
/// A frame without an opcode is a polling message: it only probes whether a
/// device acknowledges `destination`. Operands are stored inline so messages
/// are `Copy` and never allocate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CecMessage {
    pub source: LogicalAddress,
    pub destination: LogicalAddress,
    pub opcode: Option<Opcode>,
    params: [u8; MAX_PARAMS],
    params_len: u8,
}

impl CecMessage {
    /// Creates a message carrying `opcode` and `params`.
    pub fn new(
        source: LogicalAddress,
        destination: LogicalAddress,
        opcode: Opcode,
        params: &[u8],
    ) -> Result<Self, EncodeError> {
        if params.len() > MAX_PARAMS {
            return Err(EncodeError::TooManyParams);
        }
        Ok(Self::build(source, destination, Some(opcode), params))
    }

    /// A polling message: header byte only.
    pub const fn polling(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self {
            source,
            destination,
            opcode: None,
            params: [0; MAX_PARAMS],
            params_len: 0,
        }
    }

    fn build(
        source: LogicalAddress,
        destination: LogicalAddress,
        opcode: Option<Opcode>,
        params: &[u8],
    ) -> Self {
        let len = params.len().min(MAX_PARAMS);
        let mut buf = [0u8; MAX_PARAMS];
        buf[..len].copy_from_slice(&params[..len]);
        Self {
            source,
            destination,
            opcode,
            params: buf,
            params_len: len as u8,
        }
    }

    pub fn params(&self) -> &[u8] {
        &self.params[..usize::from(self.params_len)]
    }

    pub const fn is_polling(&self) -> bool {
        self.opcode.is_none()
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == LogicalAddress::BROADCAST
    }

    /// Returns `true` if this message carries `opcode`.
    pub fn has_opcode(&self, opcode: Opcode) -> bool {
        self.opcode == Some(opcode)
    }

    /// Encoded length in bytes.
    pub fn frame_len(&self) -> usize {
        match self.opcode {
            Some(_) => 2 + usize::from(self.params_len),
            None => 1,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8((self.source.to_u8() << 4) | self.destination.to_u8())?;
        if let Some(opcode) = self.opcode {
            w.write_u8(opcode.to_u8())?;
            w.write_all(self.params())?;
        }
        Ok(())
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(DecodeError::FrameTooLong);
        }
        let mut r = Reader::new(frame);
        let header = r.read_u8()?;
        let source = LogicalAddress::from_u8(header >> 4);
        let destination = LogicalAddress::from_u8(header);
        if r.is_empty() {
            return Ok(Self::polling(source, destination));
        }
        let opcode = Opcode::from_u8(r.read_u8()?);
        Ok(Self::build(source, destination, Some(opcode), r.read_rest()))
    }

    /// Physical address operand of `<Report Physical Address>`,
    /// `<Active Source>` and `<Routing Change>` (the new address).
    pub fn physical_address(&self) -> Option<PhysicalAddress> {
        let mut r = Reader::new(self.params());
        match self.opcode? {
            Opcode::ReportPhysicalAddress | Opcode::ActiveSource => {
                r.read_be_u16().ok().map(PhysicalAddress::new)
            }
            Opcode::RoutingChange => {
                r.read_be_u16().ok()?;
                r.read_be_u16().ok().map(PhysicalAddress::new)
            }
            _ => None,
        }
    }

    /// Device type operand of `<Report Physical Address>`.
    pub fn reported_device_type(&self) -> Option<DeviceType> {
        if !self.has_opcode(Opcode::ReportPhysicalAddress) {
            return None;
        }
        self.params().get(2).copied().map(DeviceType::from_u8)
    }

    /// Name operand of `<Set OSD Name>`.
    pub fn osd_name(&self) -> Option<&str> {
        if !self.has_opcode(Opcode::SetOsdName) {
            return None;
        }
        core::str::from_utf8(self.params()).ok()
    }

    /// Vendor operand of `<Device Vendor ID>`.
    pub fn vendor_id(&self) -> Option<VendorId> {
        if !self.has_opcode(Opcode::DeviceVendorId) {
            return None;
        }
        Reader::new(self.params())
            .read_be_u24()
            .ok()
            .map(VendorId::new)
    }

    /// Status operand of `<Report Power Status>`.
    pub fn power_status(&self) -> Option<PowerStatus> {
        if !self.has_opcode(Opcode::ReportPowerStatus) {
            return None;
        }
        self.params().first().copied().map(PowerStatus::from_u8)
    }

    /// The opcode a `<Feature Abort>` refers to.
    pub fn aborted_opcode(&self) -> Option<Opcode> {
        if !self.has_opcode(Opcode::FeatureAbort) {
            return None;
        }
        self.params().first().copied().map(Opcode::from_u8)
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        if !self.has_opcode(Opcode::FeatureAbort) {
            return None;
        }
        self.params().get(1).copied().map(AbortReason::from_u8)
    }

    /// Returns `true` for a `<Feature Abort>` that aborts `opcode`.
    pub fn is_feature_abort_of(&self, opcode: Opcode) -> bool {
        self.aborted_opcode() == Some(opcode)
    }

    pub fn give_physical_address(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::GivePhysicalAddress), &[])
    }

    pub fn report_physical_address(
        source: LogicalAddress,
        physical_address: PhysicalAddress,
        device_type: DeviceType,
    ) -> Self {
        let [hi, lo] = physical_address.raw().to_be_bytes();
        Self::build(
            source,
            LogicalAddress::BROADCAST,
            Some(Opcode::ReportPhysicalAddress),
            &[hi, lo, device_type.to_u8()],
        )
    }

    pub fn give_osd_name(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::GiveOsdName), &[])
    }

    /// `<Set OSD Name>`; names longer than 14 bytes are cut at the last
    /// character boundary that fits.
    pub fn set_osd_name(source: LogicalAddress, destination: LogicalAddress, name: &str) -> Self {
        let mut end = name.len().min(MAX_PARAMS);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self::build(
            source,
            destination,
            Some(Opcode::SetOsdName),
            &name.as_bytes()[..end],
        )
    }

    pub fn give_device_vendor_id(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::GiveDeviceVendorId), &[])
    }

    pub fn device_vendor_id(source: LogicalAddress, vendor_id: VendorId) -> Self {
        let bytes = vendor_id.raw().to_be_bytes();
        Self::build(
            source,
            LogicalAddress::BROADCAST,
            Some(Opcode::DeviceVendorId),
            &bytes[1..],
        )
    }

    pub fn give_device_power_status(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::GiveDevicePowerStatus), &[])
    }

    pub fn report_power_status(
        source: LogicalAddress,
        destination: LogicalAddress,
        status: PowerStatus,
    ) -> Self {
        Self::build(
            source,
            destination,
            Some(Opcode::ReportPowerStatus),
            &[status.to_u8()],
        )
    }

    pub fn request_arc_initiation(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::RequestArcInitiation), &[])
    }

    pub fn request_arc_termination(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::RequestArcTermination), &[])
    }

    pub fn initiate_arc(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::InitiateArc), &[])
    }

    pub fn terminate_arc(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::TerminateArc), &[])
    }

    pub fn report_arc_initiated(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::ReportArcInitiated), &[])
    }

    pub fn report_arc_terminated(source: LogicalAddress, destination: LogicalAddress) -> Self {
        Self::build(source, destination, Some(Opcode::ReportArcTerminated), &[])
    }

    pub fn active_source(source: LogicalAddress, physical_address: PhysicalAddress) -> Self {
        Self::build(
            source,
            LogicalAddress::BROADCAST,
            Some(Opcode::ActiveSource),
            &physical_address.raw().to_be_bytes(),
        )
    }

    pub fn feature_abort(
        source: LogicalAddress,
        destination: LogicalAddress,
        aborted: Opcode,
        reason: AbortReason,
    ) -> Self {
        Self::build(
            source,
            destination,
            Some(Opcode::FeatureAbort),
            &[aborted.to_u8(), reason.to_u8()],
        )
    }
}

impl fmt::Debug for CecMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CecMessage")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("opcode", &self.opcode)
            .field("params", &self.params())
            .finish()
    }
}

/// Formats the frame the way bus monitors print it, e.g. `4f:84:10:00:04`.
impl fmt::Display for CecMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}{:x}", self.source.to_u8(), self.destination.to_u8())?;
        if let Some(opcode) = self.opcode {
            write!(f, ":{:02x}", opcode.to_u8())?;
            for byte in self.params() {
                write!(f, ":{byte:02x}")?;
            }
        }
        Ok(())
    }
}
