//! Write zipped [ESRI shapefiles](https://www.esri.com/content/dam/esrisites/sitecore-archive/Files/Pdfs/library/whitepapers/pdfs/shapefile.pdf).

mod writer;

pub use writer::{ShapefileEncoder, MAX_NAME_LEN};
