mod importer;

pub use importer::ItemImporter;
