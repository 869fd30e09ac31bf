//! 积分榜状态摘要与快照校验和

use sha2::{Digest, Sha256};

use crate::entities::StandingsEntry;

/// 有序积分榜的 SHA-256（小写十六进制）。
///
/// 每行按固定字段顺序编码后依次写入摘要，行序就是排名顺序，
/// 所以两张表只有在内容和顺序都相同时才得到相同的摘要。空表也有确定的摘要。
pub fn state_hash(entries: &[StandingsEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        let line = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            entry.rank,
            entry.team_id,
            entry.team_name,
            entry.played,
            entry.won,
            entry.drawn,
            entry.lost,
            entry.goals_for,
            entry.goals_against,
            entry.goal_difference,
            entry.points,
        );
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// 快照 payload 的校验和
pub fn payload_checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
