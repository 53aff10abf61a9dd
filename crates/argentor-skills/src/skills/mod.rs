mod text_extract;

pub use text_extract::TextExtractSkill;
