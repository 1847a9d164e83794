pub mod dav_logging;
