//! Wire-level constants for the board devices and the serial probe

/// AD5272 control-register write command; `AD5272_UNLOCK_VALUE` enables RDAC updates
pub const AD5272_CONTROL_REGISTER: u8 = 0x1C;
pub const AD5272_UNLOCK_VALUE: u8 = 0x02;
/// Command number for writing the RDAC wiper
pub const AD5272_CMD_WRITE_RDAC: u8 = 0b0001;
/// Command number for reading the RDAC wiper back
pub const AD5272_CMD_READ_RDAC: u8 = 0b0010;
/// The RDAC register is 10 bits wide
pub const AD5272_RDAC_MASK: u16 = 0x03FF;

/// Device address field shared by every MCP3564 command byte
pub const MCP3564_DEVICE_ADDRESS: u8 = 0b01;
/// Gain calibration written during initialization
pub const MCP3564_GAIN_CAL: [u8; 3] = [0x7C, 0xAB, 0xD8];
/// 2^23, full scale of the signed 24-bit conversion result
pub const MCP3564_FULL_SCALE: f64 = 8_388_608.0;

pub const PROBE_HANDSHAKE_REQUEST: &[u8] = b"S\n";
pub const PROBE_HANDSHAKE_ACK: &str = "U";
pub const PROBE_DATA_REQUEST: &[u8] = b"R\n";
