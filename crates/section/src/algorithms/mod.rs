pub mod decode;
pub mod skeleton;
pub mod polygonize;
pub mod scale;
pub mod compose;
pub mod mesh;
pub mod integrate;

pub use decode::*;
pub use skeleton::*;
pub use polygonize::*;
pub use scale::*;
pub use compose::*;
pub use mesh::*;
pub use integrate::*;
