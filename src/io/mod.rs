pub mod csv_loader;
pub mod csv_writer;
