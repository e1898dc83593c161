use crate::Entity;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Entity)]
pub struct T {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub i: i32,
    pub j: Option<i32>,
    pub l: Option<Vec<i32>>,
    #[serde(rename = "aa")]
    pub a: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Entity)]
pub struct T2 {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[field(nested)]
    pub t: T,
}

