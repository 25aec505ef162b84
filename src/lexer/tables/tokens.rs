// src/lexer/tables/tokens.rs
use core::{fmt, str::FromStr};

use crate::error::SerialiseError;

macro_rules! token_types {
    ($($(#[$attr:meta])* $name:ident = $value:expr,)*) => {
        /// Lexical categories.
        ///
        /// Values are grouped so that `value / 1000` is the category and
        /// `value / 100` the sub-category; negative values are meta types that
        /// never fall back.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum TokenType {
            $($(#[$attr])* $name = $value,)*
        }

        impl TokenType {
            pub const ALL: &'static [TokenType] = &[$(TokenType::$name,)*];

            /// Canonical name, as used by the codecs.
            pub const fn name(self) -> &'static str {
                match self {
                    $(TokenType::$name => stringify!($name),)*
                }
            }
        }

        impl TryFrom<i32> for TokenType {
            type Error = i32;
            fn try_from(v: i32) -> Result<Self, i32> {
                match v {
                    $(x if x == $value => Ok(TokenType::$name),)*
                    _ => Err(v),
                }
            }
        }

        impl FromStr for TokenType {
            type Err = SerialiseError;
            fn from_str(s: &str) -> Result<Self, SerialiseError> {
                match s {
                    $(stringify!($name) => Ok(TokenType::$name),)*
                    _ => Err(SerialiseError::UnknownTokenType(s.to_owned())),
                }
            }
        }
    };
}

token_types! {
    /// Input no rule matched, or a mis-specified emission.
    Error = -1,
    /// Text meant to be handed to a delegate lexer.
    Other = -2,
    /// No highlighting.
    None = -3,

    Keyword = 1000,
    KeywordConstant = 1001,
    KeywordDeclaration = 1002,
    KeywordNamespace = 1003,
    KeywordPseudo = 1004,
    KeywordReserved = 1005,
    KeywordType = 1006,

    Name = 2000,
    NameAttribute = 2001,
    NameBuiltin = 2002,
    NameBuiltinPseudo = 2003,
    NameClass = 2004,
    NameConstant = 2005,
    NameDecorator = 2006,
    NameEntity = 2007,
    NameException = 2008,
    NameFunction = 2009,
    NameFunctionMagic = 2010,
    NameKeyword = 2011,
    NameLabel = 2012,
    NameNamespace = 2013,
    NameOperator = 2014,
    NameOther = 2015,
    NamePseudo = 2016,
    NameProperty = 2017,
    NameTag = 2018,
    NameVariable = 2019,
    NameVariableAnonymous = 2020,
    NameVariableClass = 2021,
    NameVariableGlobal = 2022,
    NameVariableInstance = 2023,
    NameVariableMagic = 2024,

    Literal = 3000,
    LiteralDate = 3001,
    LiteralOther = 3002,

    LiteralString = 3100,
    LiteralStringAffix = 3101,
    LiteralStringAtom = 3102,
    LiteralStringBacktick = 3103,
    LiteralStringBoolean = 3104,
    LiteralStringChar = 3105,
    LiteralStringDelimiter = 3106,
    LiteralStringDoc = 3107,
    LiteralStringDouble = 3108,
    LiteralStringEscape = 3109,
    LiteralStringHeredoc = 3110,
    LiteralStringInterpol = 3111,
    LiteralStringName = 3112,
    LiteralStringOther = 3113,
    LiteralStringRegex = 3114,
    LiteralStringSingle = 3115,
    LiteralStringSymbol = 3116,

    LiteralNumber = 3200,
    LiteralNumberBin = 3201,
    LiteralNumberFloat = 3202,
    LiteralNumberHex = 3203,
    LiteralNumberInteger = 3204,
    LiteralNumberIntegerLong = 3205,
    LiteralNumberOct = 3206,
    LiteralNumberByte = 3207,

    Operator = 4000,
    OperatorWord = 4001,

    Punctuation = 5000,

    Comment = 6000,
    CommentHashbang = 6001,
    CommentMultiline = 6002,
    CommentSingle = 6003,
    CommentSpecial = 6004,

    CommentPreproc = 6100,
    CommentPreprocFile = 6101,

    Generic = 7000,
    GenericDeleted = 7001,
    GenericEmph = 7002,
    GenericError = 7003,
    GenericHeading = 7004,
    GenericInserted = 7005,
    GenericOutput = 7006,
    GenericPrompt = 7007,
    GenericStrong = 7008,
    GenericSubheading = 7009,
    GenericTraceback = 7010,
    GenericUnderline = 7011,

    Text = 8000,
    TextWhitespace = 8001,
    TextSymbol = 8002,
    TextPunctuation = 8003,
}

// Short aliases grammar authors reach for.
#[allow(non_upper_case_globals)]
impl TokenType {
    pub const Whitespace: TokenType = TokenType::TextWhitespace;
    pub const Date: TokenType = TokenType::LiteralDate;
    pub const String: TokenType = TokenType::LiteralString;
    pub const StringEscape: TokenType = TokenType::LiteralStringEscape;
    pub const Number: TokenType = TokenType::LiteralNumber;
    pub const NumberInteger: TokenType = TokenType::LiteralNumberInteger;
    pub const NumberFloat: TokenType = TokenType::LiteralNumberFloat;
}

impl TokenType {
    #[inline]
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Nearest enclosing category, e.g. `LiteralStringEscape -> LiteralString -> Literal`.
    /// Top-level categories and meta types have no parent.
    pub fn parent(self) -> Option<TokenType> {
        let v = self.value();
        if v <= 0 {
            return Option::None;
        }
        let up = if v % 100 != 0 {
            v / 100 * 100
        } else if v % 1000 != 0 {
            v / 1000 * 1000
        } else {
            return Option::None;
        };
        TokenType::try_from(up).ok()
    }

    /// `self`, then each ancestor up to the top-level category.
    pub fn ancestors(self) -> impl Iterator<Item = TokenType> {
        core::iter::successors(Some(self), |t| t.parent())
    }

    /// First of `self` and its ancestors accepted by `known`; `Other` when
    /// nothing in the chain is.
    pub fn fallback(self, known: impl Fn(TokenType) -> bool) -> TokenType {
        self.ancestors().find(|t| known(*t)).unwrap_or(TokenType::Other)
    }

    pub fn category(self) -> i32 {
        self.value() / 1000 * 1000
    }

    pub fn sub_category(self) -> i32 {
        self.value() / 100 * 100
    }

    pub fn in_category(self, other: TokenType) -> bool {
        self.value() / 1000 == other.value() / 1000
    }

    pub fn in_sub_category(self, other: TokenType) -> bool {
        self.value() / 100 == other.value() / 100
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
