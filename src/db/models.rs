use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generates a string-backed enum: the wire and storage representation is the
/// exact uppercase tag, both for serde and for SQLite columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $tag),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(Self::$variant),)+
                    other => Err(format!("Invalid {}: {}", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(Role {
    Admin => "ADMIN",
    Professor => "PROFESSOR",
    Aluno => "ALUNO",
    Escola => "ESCOLA",
    Comunidade => "COMUNIDADE",
});

text_enum!(SchoolType {
    Escola => "ESCOLA",
    Creche => "CRECHE",
    Cmei => "CMEI",
});

text_enum!(Zone {
    Urbana => "URBANA",
    Rural => "RURAL",
});

text_enum!(ReactionType {
    Like => "LIKE",
    Love => "LOVE",
    Clap => "CLAP",
    Rocket => "ROCKET",
    Idea => "IDEA",
});

text_enum!(ModerationStatus {
    Pendente => "PENDENTE",
    Aprovado => "APROVADO",
    Reprovado => "REPROVADO",
});

text_enum!(TestimonialStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

text_enum!(BadgeType {
    Proativo => "PROATIVO",
    Especial => "ESPECIAL",
    Harmonioso => "HARMONIOSO",
});

/// Full user row. The password hash never leaves the data layer; responses
/// are built from `UserSummary` or explicit field lists.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub school_id: Option<String>,
    pub school_type: Option<SchoolType>,
    pub zone: Option<Zone>,
    pub inep: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
}

/// The author/sender shape embedded in posts, comments and testimonials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub post_id: String,
    pub author: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyEvent {
    pub id: String,
    pub name: String,
    pub date: String,
    pub link: Option<String>,
}
