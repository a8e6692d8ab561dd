// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lua scripts executed atomically by Redis.

/// KEYS[1] binding key, KEYS[2] stamp key; ARGV[1] new value, ARGV[2] stamp.
/// Returns {"created"}, {"unchanged"} or {"replaced", prior}.
pub(crate) const COMPARE_AND_ASSIGN: &str = r#"
local prior = redis.call('GET', KEYS[1])
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
if not prior then
  return {'created'}
end
if prior == ARGV[1] then
  return {'unchanged'}
end
return {'replaced', prior}
"#;

/// KEYS[1] scope; ARGV[1] score, ARGV[2] member, ARGV[3] capacity.
/// Returns the size after trimming.
pub(crate) const APPEND_AND_TRIM: &str = r#"
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
local cap = tonumber(ARGV[3])
local size = redis.call('ZCARD', KEYS[1])
if size > cap then
  redis.call('ZREMRANGEBYRANK', KEYS[1], 0, size - cap - 1)
  size = cap
end
return size
"#;

/// KEYS[1] queue; ARGV[1] now, ARGV[2] max. Returns and removes due members.
pub(crate) const CLAIM_DUE: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
if #due > 0 then
  redis.call('ZREM', KEYS[1], unpack(due))
end
return due
"#;
