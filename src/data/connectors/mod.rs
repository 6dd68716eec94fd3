mod csv;

pub use csv::{PanelCsvConnector, DATE_COLUMN, FORWARD_RETURN_COLUMN, INSTRUMENT_COLUMN};
