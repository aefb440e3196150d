//! Shared protocol constants for the tracker/storage wire format

// Header: PKG_LEN (8) | CMD (1) | STATUS (1)
pub const HEADER_LEN: usize = 10;

// Fixed field widths
pub const GROUP_NAME_MAX_LEN: usize = 16;
pub const IP_ADDRESS_SIZE: usize = 16;
pub const FILE_EXT_NAME_MAX_LEN: usize = 6;
pub const FILE_PREFIX_MAX_LEN: usize = 16;

// Request body sizes excluding variable-length tails
// store_path_index (1) | file_size (8) | ext (6)
pub const UPLOAD_REQ_LEN: usize = 1 + 8 + FILE_EXT_NAME_MAX_LEN;
// master_len (8) | file_size (8) | prefix (16) | ext (6)
pub const UPLOAD_SLAVE_REQ_LEN: usize = 8 + 8 + FILE_PREFIX_MAX_LEN + FILE_EXT_NAME_MAX_LEN;
// offset (8) | download_bytes (8) | group (16)
pub const DOWNLOAD_REQ_LEN: usize = 8 + 8 + GROUP_NAME_MAX_LEN;

// Response body sizes
// group (16) | ip (15) | port (8)
pub const STORAGE_LOOKUP_FETCH_LEN: usize = GROUP_NAME_MAX_LEN + IP_ADDRESS_SIZE - 1 + 8;
// ... | store_path_index (1)
pub const STORAGE_LOOKUP_STORE_LEN: usize = STORAGE_LOOKUP_FETCH_LEN + 1;

// Command codes (numeric values are the service's published contract)
pub mod cmd {
    pub const TRACKER_RESP: u8 = 100;
    pub const QUERY_STORE_WITHOUT_GROUP_ONE: u8 = 101;
    pub const QUERY_FETCH_ONE: u8 = 102;
    pub const QUERY_UPDATE: u8 = 103;
    pub const QUERY_STORE_WITH_GROUP_ONE: u8 = 104;

    pub const UPLOAD_FILE: u8 = 11;
    pub const DOWNLOAD_FILE: u8 = 14;
    pub const UPLOAD_SLAVE_FILE: u8 = 21;
}

pub mod defaults {
    pub const TRACKER_PORT: u16 = 22122;
    pub const MIN_CONNS: usize = 0;
    pub const MAX_CONNS: usize = 150;
}
