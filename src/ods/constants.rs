/// Firebird / RedDatabase on-disk structure constants.
///
/// Offsets are byte positions from the start of a page. All multi-byte
/// fields are stored little-endian. Values follow the engine's `ods.h`
/// layouts for ODS 11 (legacy family) and ODS 12/13 (current family).
// Page sizes
pub const SIZE_PAGE_1K: u32 = 1024;
pub const SIZE_PAGE_2K: u32 = 2048;
pub const SIZE_PAGE_4K: u32 = 4096;
pub const SIZE_PAGE_8K: u32 = 8192;
pub const SIZE_PAGE_16K: u32 = 16384;
pub const SIZE_PAGE_32K: u32 = 32768;
pub const VALID_PAGE_SIZES: [u32; 6] = [
    SIZE_PAGE_1K,
    SIZE_PAGE_2K,
    SIZE_PAGE_4K,
    SIZE_PAGE_8K,
    SIZE_PAGE_16K,
    SIZE_PAGE_32K,
];

// Block sizes accepted for hole punching
pub const BLOCK_SIZE_512: u32 = 512;
pub const BLOCK_SIZE_4K: u32 = 4096;
pub const DEFAULT_BLOCK_SIZE: u32 = BLOCK_SIZE_512;
pub const VALID_BLOCK_SIZES: [u32; 2] = [BLOCK_SIZE_512, BLOCK_SIZE_4K];

// Page header (16 bytes, identical in both families)
pub const SIZE_PAGE_HEADER: usize = 16;
pub const PAG_TYPE: usize = 0; // 1 byte - page type
pub const PAG_FLAGS: usize = 1; // 1 byte - page flags
pub const PAG_CHECKSUM: usize = 2; // 2 bytes - checksum
pub const PAG_GENERATION: usize = 4; // 4 bytes - generation
pub const PAG_SCN: usize = 8; // 4 bytes - scn
pub const PAG_RESERVED: usize = 12; // 4 bytes - reserved / page number

// Header page (page 0)
pub const HEADER_PAGE_NUMBER: u64 = 0;
pub const HDR_PAGE_SIZE: usize = 0x10; // 2 bytes
pub const HDR_ODS_VERSION: usize = 0x12; // 2 bytes
pub const HDR_PAGES: usize = 0x14; // 4 bytes - first pointer page of RDB$PAGES
pub const HDR_NEXT_PAGE: usize = 0x18; // 4 bytes - next header page (multi-file)
pub const HDR_OLDEST_TRANSACTION: usize = 0x1C; // 4 bytes
pub const HDR_OLDEST_ACTIVE: usize = 0x20; // 4 bytes
pub const HDR_NEXT_TRANSACTION: usize = 0x24; // 4 bytes
pub const HDR_SEQUENCE: usize = 0x28; // 2 bytes
pub const HDR_FLAGS: usize = 0x2A; // 2 bytes
pub const SIZE_HEADER_FIXED: usize = 0x2C;

// Header flags, legacy family (ODS 11)
pub const LEGACY_HDR_ENCRYPTED: u16 = 0x0040;
pub const LEGACY_HDR_SHUTDOWN_MASK: u16 = 0x1080;
pub const LEGACY_HDR_SHUTDOWN_MULTI: u16 = 0x0080;
pub const LEGACY_HDR_SHUTDOWN_FULL: u16 = 0x1000;
pub const LEGACY_HDR_SHUTDOWN_SINGLE: u16 = 0x1080;
pub const LEGACY_HDR_BACKUP_MASK: u16 = 0x0C00;
pub const LEGACY_HDR_NBAK_STALLED: u16 = 0x0400;
pub const LEGACY_HDR_NBAK_MERGE: u16 = 0x0800;

// Header flags, current family (ODS 12+)
pub const CURRENT_HDR_CRYPT_PROCESS: u16 = 0x0004;
pub const CURRENT_HDR_ENCRYPTED: u16 = 0x0040;
pub const CURRENT_HDR_BACKUP_MASK: u16 = 0x0180;
pub const CURRENT_HDR_NBAK_STALLED: u16 = 0x0080;
pub const CURRENT_HDR_NBAK_MERGE: u16 = 0x0100;
pub const CURRENT_HDR_SHUTDOWN_MASK: u16 = 0x0600;
pub const CURRENT_HDR_SHUTDOWN_MULTI: u16 = 0x0200;
pub const CURRENT_HDR_SHUTDOWN_FULL: u16 = 0x0400;
pub const CURRENT_HDR_SHUTDOWN_SINGLE: u16 = 0x0600;
pub const CURRENT_HDR_REPLICA_MASK: u16 = 0x1800;
pub const CURRENT_HDR_REPLICA_READ_ONLY: u16 = 0x0800;
pub const CURRENT_HDR_REPLICA_READ_WRITE: u16 = 0x1000;

// Page inventory page
pub const FIRST_PIP_PAGE: u64 = 1;
pub const PIP_MIN: usize = 16; // 4 bytes - lowest page that may be free
pub const LEGACY_PIP_BITS: usize = 20;
pub const CURRENT_PIP_EXTENT: usize = 20; // 4 bytes - lowest free extent
pub const CURRENT_PIP_USED: usize = 24; // 4 bytes - pages in use
pub const CURRENT_PIP_BITS: usize = 28;

// Data page
pub const DPG_SEQUENCE: usize = 16; // 4 bytes
pub const DPG_RELATION: usize = 20; // 2 bytes
pub const DPG_COUNT: usize = 22; // 2 bytes - fragment directory entries
pub const DPG_REPEAT: usize = 24; // start of fragment directory
pub const SIZE_DPG_REPEAT: usize = 4; // offset (2) + length (2)

// Blob page
pub const BLP_LEAD_PAGE: usize = 16; // 4 bytes
pub const BLP_SEQUENCE: usize = 20; // 4 bytes
pub const BLP_LENGTH: usize = 24; // 2 bytes - content length
pub const BLP_PAD: usize = 26; // 2 bytes
pub const BLP_PAGE: usize = 28; // start of content

// B-tree page
pub const BTR_SIBLING: usize = 16; // 4 bytes
pub const BTR_LEFT_SIBLING: usize = 20; // 4 bytes
pub const BTR_PREFIX_TOTAL: usize = 24; // 4 bytes
pub const BTR_RELATION: usize = 28; // 2 bytes
pub const BTR_LENGTH: usize = 30; // 2 bytes - bucket length
pub const BTR_ID: usize = 32; // 1 byte
pub const BTR_LEVEL: usize = 33; // 1 byte
pub const BTR_JUMP_INTERVAL: usize = 34; // 2 bytes
pub const BTR_JUMP_SIZE: usize = 36; // 2 bytes
pub const BTR_JUMP_COUNT: usize = 38; // 1 byte
pub const BTR_NODES: usize = 39; // start of bucket

// Occupancy bitmaps are u64, so a page holds at most 64 blocks
pub const MAX_BLOCKS_PER_PAGE: u32 = 64;
