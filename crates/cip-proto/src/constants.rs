//! CIP service codes and standard class IDs named in §6.

/// CIP service codes.
pub mod service {
    /// `Get_Attribute_All`.
    pub const GET_ATTRIBUTE_ALL: u8 = 0x01;
    /// `Set_Attribute_All`.
    pub const SET_ATTRIBUTE_ALL: u8 = 0x02;
    /// `Get_Attribute_List`.
    pub const GET_ATTRIBUTE_LIST: u8 = 0x03;
    /// `Set_Attribute_List`.
    pub const SET_ATTRIBUTE_LIST: u8 = 0x04;
    /// `Reset`.
    pub const RESET: u8 = 0x05;
    /// `Multiple_Service_Packet`.
    pub const MULTIPLE_SERVICE_PACKET: u8 = 0x0A;
    /// `Get_Attribute_Single`.
    pub const GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
    /// `Set_Attribute_Single`.
    pub const SET_ATTRIBUTE_SINGLE: u8 = 0x10;
    /// `Execute_PCCC`.
    pub const EXECUTE_PCCC: u8 = 0x4B;
    /// `Read_Tag`.
    pub const READ_TAG: u8 = 0x4C;
    /// `Write_Tag`.
    pub const WRITE_TAG: u8 = 0x4D;
    /// `Forward_Close` (on Connection_Manager).
    pub const FORWARD_CLOSE: u8 = 0x4E;
    /// `Unconnected_Send` (on Connection_Manager) / `Read_Tag_Fragmented`
    /// (on Symbol_Object) - class-dependent per §6.
    pub const UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED: u8 = 0x52;
    /// `Write_Tag_Fragmented`.
    pub const WRITE_TAG_FRAGMENTED: u8 = 0x53;
    /// `Forward_Open`.
    pub const FORWARD_OPEN: u8 = 0x54;
    /// `Get_Instance_Attribute_List`.
    pub const GET_INSTANCE_ATTRIBUTE_LIST: u8 = 0x55;
    /// `Large_Forward_Open`.
    pub const LARGE_FORWARD_OPEN: u8 = 0x5B;

    /// Response bit: response service code is `request | 0x80`.
    pub const RESPONSE_BIT: u8 = 0x80;

    /// Echo `request` as the response service code.
    #[must_use]
    pub const fn response_of(request: u8) -> u8 {
        request | RESPONSE_BIT
    }

    /// True if `service` is the echoed-response form of some request.
    #[must_use]
    pub const fn is_response(service: u8) -> bool {
        service & RESPONSE_BIT != 0
    }
}

/// CIP general status codes used by this harness (ODVA defines many more;
/// only the ones the spec names are enumerated here).
pub mod general_status {
    /// Success.
    pub const SUCCESS: u8 = 0x00;
    /// Connection failure (generic).
    pub const GENERAL_ERROR: u8 = 0x01;
    /// Service not supported.
    pub const SERVICE_NOT_SUPPORTED: u8 = 0x08;
    /// Attribute not settable.
    pub const ATTRIBUTE_NOT_SETTABLE: u8 = 0x05;
    /// Reply data too large (fragmented read has more to come).
    pub const REPLY_DATA_TOO_LARGE: u8 = 0x06;
    /// Path destination unknown.
    pub const PATH_DESTINATION_UNKNOWN: u8 = 0x05;
    /// Attribute not supported.
    pub const ATTRIBUTE_NOT_SUPPORTED: u8 = 0x14;
    /// Type mismatch on a fragmented write.
    pub const TYPE_MISMATCH: u8 = 0x13;
}

/// Standard CIP class IDs (§6).
pub mod class {
    /// `Identity`.
    pub const IDENTITY: u16 = 0x01;
    /// `Message_Router`.
    pub const MESSAGE_ROUTER: u16 = 0x02;
    /// `Assembly`.
    pub const ASSEMBLY: u16 = 0x04;
    /// `Connection_Manager`.
    pub const CONNECTION_MANAGER: u16 = 0x06;
    /// `File_Object`.
    pub const FILE_OBJECT: u16 = 0x37;
    /// `Symbol_Object` (Rockwell tag database).
    pub const SYMBOL_OBJECT: u16 = 0x6B;
    /// `Template_Object`.
    pub const TEMPLATE_OBJECT: u16 = 0x6C;
    /// `TCP/IP_Interface`.
    pub const TCP_IP_INTERFACE: u16 = 0xF5;
    /// `Ethernet_Link`.
    pub const ETHERNET_LINK: u16 = 0xF6;
}
