//! RCCH/RTCH layer-3 messages.
//!
//! Every message lives in an 18-byte layer-3 buffer with the 6-bit message
//! type leading; the factory turns buffers into typed variants and back.

use super::{RCCH_LC_LENGTH_BYTES, message_type};
use crate::SiteData;
use crate::bits::{get_u16, set_u16};
use crate::errors::DecodeError;

/// Voice-call service options shared by VCALL and VCALL_CONN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
	pub emergency: bool,
	pub encrypted: bool,
	pub priority: u8,
}

impl CallOptions {
	fn pack(&self) -> u8 {
		let mut b = self.priority & 0x07;
		if self.emergency {
			b |= 0x80;
		}
		if self.encrypted {
			b |= 0x40;
		}
		b
	}

	fn unpack(b: u8) -> Self {
		Self {
			emergency: b & 0x80 == 0x80,
			encrypted: b & 0x40 == 0x40,
			priority: b & 0x07,
		}
	}
}

/// One layer-3 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rcch {
	/// Voice call request (ISP) / traffic header (RTCH).
	VCall {
		options: CallOptions,
		call_type: u8,
		src_id: u16,
		dst_id: u16,
	},
	/// Voice call connection response with the granted channel.
	VCallConn {
		options: CallOptions,
		call_type: u8,
		src_id: u16,
		dst_id: u16,
		cause: u8,
		grp_vch_no: u16,
	},
	/// Voice call assignment toward the traffic channel.
	VCallAssgn {
		options: CallOptions,
		src_id: u16,
		dst_id: u16,
		grp_vch_no: u16,
	},
	/// Transmission release.
	TxRel { src_id: u16, dst_id: u16, cause: u8 },
	/// Unit registration request/response.
	Reg {
		reg_option: u8,
		loc_id: u16,
		src_id: u16,
		dst_id: u16,
		cause: u8,
	},
	/// Group registration request/response.
	GrpReg {
		grp_option: u8,
		loc_id: u16,
		src_id: u16,
		dst_id: u16,
		cause: u8,
	},
	/// Registration clear request/response.
	RegC {
		reg_option: u8,
		loc_id: u16,
		src_id: u16,
		cause: u8,
	},
	/// Registration command.
	RegComm { loc_id: u16, dst_id: u16 },
	/// Site information broadcast with the control-channel structure
	/// counters.
	SiteInfo {
		loc_id: u32,
		bcch_cnt: u8,
		rcch_grouping_cnt: u8,
		ccch_paging_cnt: u8,
		ccch_multi_cnt: u8,
		rcch_iterate_cnt: u8,
		site_info1: u8,
		site_info2: u8,
		version: u8,
		channel_no: u16,
	},
	/// Service information broadcast.
	SrvInfo {
		loc_id: u32,
		service_info: u8,
		site_info2: u8,
		restriction: u8,
	},
	/// Digital station ID.
	DstIdInfo { callsign: [u8; 8] },
	Idle,
	Disc { src_id: u16, cause: u8 },
	/// Pre-built layer-3 payload pushed through untouched.
	Raw { data: [u8; RCCH_LC_LENGTH_BYTES] },
}

impl Rcch {
	/// Decodes a layer-3 buffer. RTCH and RCCH share message-type points;
	/// `traffic` selects the traffic-channel reading.
	pub fn decode(data: &[u8], traffic: bool) -> Result<Self, DecodeError> {
		if data.len() < RCCH_LC_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}

		let msg_type = data[0] & 0x3F;
		let message = match msg_type {
			message_type::RCCH_VCALL_CONN if !traffic => Self::VCallConn {
				options: CallOptions::unpack(data[1]),
				call_type: data[2],
				src_id: get_u16(data, 3),
				dst_id: get_u16(data, 5),
				cause: data[7],
				grp_vch_no: get_u16(data, 8) & 0x3FF,
			},
			message_type::RTCH_VCALL => Self::VCall {
				options: CallOptions::unpack(data[1]),
				call_type: data[2],
				src_id: get_u16(data, 3),
				dst_id: get_u16(data, 5),
			},
			message_type::RCCH_VCALL_ASSGN => Self::VCallAssgn {
				options: CallOptions::unpack(data[1]),
				src_id: get_u16(data, 3),
				dst_id: get_u16(data, 5),
				grp_vch_no: get_u16(data, 8) & 0x3FF,
			},
			message_type::RTCH_TX_REL | message_type::RTCH_TX_REL_EX => Self::TxRel {
				src_id: get_u16(data, 3),
				dst_id: get_u16(data, 5),
				cause: data[7],
			},
			message_type::RCCH_REG => Self::Reg {
				reg_option: data[1] >> 3,
				loc_id: get_u16(data, 2),
				src_id: get_u16(data, 4),
				dst_id: get_u16(data, 6),
				cause: data[8],
			},
			message_type::RCCH_GRP_REG => Self::GrpReg {
				grp_option: data[1],
				loc_id: get_u16(data, 2),
				src_id: get_u16(data, 4),
				dst_id: get_u16(data, 6),
				cause: data[8],
			},
			message_type::RCCH_REG_C => Self::RegC {
				reg_option: data[1] >> 3,
				loc_id: get_u16(data, 2),
				src_id: get_u16(data, 4),
				cause: data[6],
			},
			message_type::RCCH_REG_COMM => Self::RegComm {
				loc_id: get_u16(data, 2),
				dst_id: get_u16(data, 4),
			},
			message_type::RCCH_SITE_INFO => Self::SiteInfo {
				loc_id: (u32::from(data[1]) << 16) | (u32::from(data[2]) << 8) | u32::from(data[3]),
				bcch_cnt: (data[4] >> 6) & 0x03,
				rcch_grouping_cnt: (data[4] >> 3) & 0x07,
				ccch_paging_cnt: ((data[4] & 0x07) << 1) | (data[5] >> 7),
				ccch_multi_cnt: (data[5] >> 4) & 0x07,
				rcch_iterate_cnt: data[5] & 0x0F,
				site_info1: data[6],
				site_info2: data[7],
				version: data[14],
				channel_no: ((u16::from(data[15] & 0x0F)) << 6) | u16::from(data[16] >> 2),
			},
			message_type::SRV_INFO => Self::SrvInfo {
				loc_id: (u32::from(data[1]) << 16) | (u32::from(data[2]) << 8) | u32::from(data[3]),
				service_info: data[4],
				site_info2: data[5],
				restriction: data[10],
			},
			message_type::DST_ID_INFO => {
				let mut callsign = [0u8; 8];
				callsign.copy_from_slice(&data[2..10]);
				Self::DstIdInfo { callsign }
			}
			message_type::IDLE => Self::Idle,
			message_type::DISC => Self::Disc {
				src_id: get_u16(data, 3),
				cause: data[7],
			},
			_ => {
				let mut raw = [0u8; RCCH_LC_LENGTH_BYTES];
				raw.copy_from_slice(&data[..RCCH_LC_LENGTH_BYTES]);
				Self::Raw { data: raw }
			}
		};
		Ok(message)
	}

	/// Encodes into an 18-byte layer-3 buffer.
	pub fn encode(&self) -> [u8; RCCH_LC_LENGTH_BYTES] {
		let mut data = [0u8; RCCH_LC_LENGTH_BYTES];

		match self {
			Self::VCall {
				options,
				call_type,
				src_id,
				dst_id,
			} => {
				data[0] = message_type::RTCH_VCALL;
				data[1] = options.pack();
				data[2] = *call_type;
				set_u16(*src_id, &mut data, 3);
				set_u16(*dst_id, &mut data, 5);
			}
			Self::VCallConn {
				options,
				call_type,
				src_id,
				dst_id,
				cause,
				grp_vch_no,
			} => {
				data[0] = message_type::RCCH_VCALL_CONN;
				data[1] = options.pack();
				data[2] = *call_type;
				set_u16(*src_id, &mut data, 3);
				set_u16(*dst_id, &mut data, 5);
				data[7] = *cause;
				set_u16(grp_vch_no & 0x3FF, &mut data, 8);
			}
			Self::VCallAssgn {
				options,
				src_id,
				dst_id,
				grp_vch_no,
			} => {
				data[0] = message_type::RCCH_VCALL_ASSGN;
				data[1] = options.pack();
				set_u16(*src_id, &mut data, 3);
				set_u16(*dst_id, &mut data, 5);
				set_u16(grp_vch_no & 0x3FF, &mut data, 8);
			}
			Self::TxRel { src_id, dst_id, cause } => {
				data[0] = message_type::RTCH_TX_REL;
				set_u16(*src_id, &mut data, 3);
				set_u16(*dst_id, &mut data, 5);
				data[7] = *cause;
			}
			Self::Reg {
				reg_option,
				loc_id,
				src_id,
				dst_id,
				cause,
			} => {
				data[0] = message_type::RCCH_REG;
				data[1] = reg_option << 3;
				set_u16(*loc_id, &mut data, 2);
				set_u16(*src_id, &mut data, 4);
				set_u16(*dst_id, &mut data, 6);
				data[8] = *cause;
			}
			Self::GrpReg {
				grp_option,
				loc_id,
				src_id,
				dst_id,
				cause,
			} => {
				data[0] = message_type::RCCH_GRP_REG;
				data[1] = *grp_option;
				set_u16(*loc_id, &mut data, 2);
				set_u16(*src_id, &mut data, 4);
				set_u16(*dst_id, &mut data, 6);
				data[8] = *cause;
			}
			Self::RegC {
				reg_option,
				loc_id,
				src_id,
				cause,
			} => {
				data[0] = message_type::RCCH_REG_C;
				data[1] = reg_option << 3;
				set_u16(*loc_id, &mut data, 2);
				set_u16(*src_id, &mut data, 4);
				data[6] = *cause;
			}
			Self::RegComm { loc_id, dst_id } => {
				data[0] = message_type::RCCH_REG_COMM;
				set_u16(*loc_id, &mut data, 2);
				set_u16(*dst_id, &mut data, 4);
			}
			Self::SiteInfo {
				loc_id,
				bcch_cnt,
				rcch_grouping_cnt,
				ccch_paging_cnt,
				ccch_multi_cnt,
				rcch_iterate_cnt,
				site_info1,
				site_info2,
				version,
				channel_no,
			} => {
				data[0] = message_type::RCCH_SITE_INFO;
				data[1] = (loc_id >> 16) as u8;
				data[2] = (loc_id >> 8) as u8;
				data[3] = *loc_id as u8;
				data[4] = ((bcch_cnt & 0x03) << 6)
					| ((rcch_grouping_cnt & 0x07) << 3)
					| ((ccch_paging_cnt >> 1) & 0x07);
				data[5] = ((ccch_paging_cnt & 0x01) << 7)
					| ((ccch_multi_cnt & 0x07) << 4)
					| (rcch_iterate_cnt & 0x0F);
				data[6] = *site_info1;
				data[7] = *site_info2;
				// restriction and channel access information ride fixed
				data[8] = 0;
				data[9] = 0;
				data[10] = 0;
				data[11] = 0;
				data[14] = *version;
				let ch = channel_no & 0x3FF;
				data[15] = ((ch >> 6) & 0x0F) as u8;
				data[16] = ((ch & 0x3F) << 2) as u8;
			}
			Self::SrvInfo {
				loc_id,
				service_info,
				site_info2,
				restriction,
			} => {
				data[0] = message_type::SRV_INFO;
				data[1] = (loc_id >> 16) as u8;
				data[2] = (loc_id >> 8) as u8;
				data[3] = *loc_id as u8;
				data[4] = *service_info;
				data[5] = *site_info2;
				data[8] = 0;
				data[9] = 0;
				data[10] = *restriction;
			}
			Self::DstIdInfo { callsign } => {
				data[0] = message_type::DST_ID_INFO;
				// start/end markers plus the character count
				data[1] = 0xC0 + 8;
				data[2..10].copy_from_slice(callsign);
			}
			Self::Idle => {
				data[0] = message_type::IDLE;
			}
			Self::Disc { src_id, cause } => {
				data[0] = message_type::DISC;
				set_u16(*src_id, &mut data, 3);
				data[7] = *cause;
			}
			Self::Raw { data: raw } => {
				data.copy_from_slice(raw);
			}
		}

		data
	}

	/// Builds the SITE_INFO broadcast for this site with the given
	/// structure counters.
	pub fn site_info(site: &SiteData, counters: &SiteCounters) -> Self {
		Self::SiteInfo {
			loc_id: site.loc_id & 0xFF_FFFF,
			bcch_cnt: counters.bcch_cnt,
			rcch_grouping_cnt: counters.rcch_grouping_cnt,
			ccch_paging_cnt: counters.ccch_paging_cnt,
			ccch_multi_cnt: counters.ccch_multi_cnt,
			rcch_iterate_cnt: counters.rcch_iterate_cnt,
			site_info1: super::site_info1::VOICE_CALL_SVC
				| super::site_info1::GRP_REG_SVC
				| super::site_info1::LOC_REG_SVC,
			site_info2: if site.net_active {
				super::site_info2::IP_NETWORK
			} else {
				0
			},
			version: 1,
			channel_no: (site.channel_no & 0x3FF) as u16,
		}
	}

	/// Builds the SRV_INFO broadcast for this site.
	pub fn srv_info(site: &SiteData) -> Self {
		Self::SrvInfo {
			loc_id: site.loc_id & 0xFF_FFFF,
			service_info: site.service_class,
			site_info2: if site.net_active {
				super::site_info2::IP_NETWORK
			} else {
				0
			},
			restriction: u8::from(!site.net_active),
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::VCall { .. } => "VCALL (Voice Call)",
			Self::VCallConn { .. } => "VCALL_CONN (Voice Call Connection)",
			Self::VCallAssgn { .. } => "VCALL_ASSGN (Voice Call Assignment)",
			Self::TxRel { .. } => "TX_REL (Transmission Release)",
			Self::Reg { .. } => "REG (Registration)",
			Self::GrpReg { .. } => "GRP_REG (Group Registration)",
			Self::RegC { .. } => "REG_C (Registration Clear)",
			Self::RegComm { .. } => "REG_COMM (Registration Command)",
			Self::SiteInfo { .. } => "SITE_INFO (Site Information)",
			Self::SrvInfo { .. } => "SRV_INFO (Service Information)",
			Self::DstIdInfo { .. } => "DST_ID_INFO (Digital Station ID)",
			Self::Idle => "IDLE (Idle)",
			Self::Disc { .. } => "DISC (Disconnect)",
			Self::Raw { .. } => "RCCH_RAW (Raw Layer-3 Message)",
		}
	}

	/// `(src_id, dst_id)` where the message carries them.
	pub fn ids(&self) -> (u16, u16) {
		match self {
			Self::VCall { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::VCallConn { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::VCallAssgn { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::TxRel { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::Reg { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::GrpReg { src_id, dst_id, .. } => (*src_id, *dst_id),
			Self::RegC { src_id, .. } => (*src_id, 0),
			Self::RegComm { dst_id, .. } => (0, *dst_id),
			Self::Disc { src_id, .. } => (*src_id, 0),
			_ => (0, 0),
		}
	}
}

/// Control-channel structure counters carried by SITE_INFO.
#[derive(Debug, Clone, Copy)]
pub struct SiteCounters {
	pub bcch_cnt: u8,
	pub rcch_grouping_cnt: u8,
	pub ccch_paging_cnt: u8,
	pub ccch_multi_cnt: u8,
	pub rcch_iterate_cnt: u8,
}

impl Default for SiteCounters {
	fn default() -> Self {
		Self {
			bcch_cnt: 1,
			rcch_grouping_cnt: 1,
			ccch_paging_cnt: 2,
			ccch_multi_cnt: 2,
			rcch_iterate_cnt: 2,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn site() -> SiteData {
		let mut site = SiteData::default();
		site.loc_id = 0x01_2345;
		site.channel_no = 1;
		site.net_active = true;
		site
	}

	#[test]
	fn site_info_round_trip() {
		let counters = SiteCounters::default();
		let msg = Rcch::site_info(&site(), &counters);
		let data = msg.encode();
		let decoded = Rcch::decode(&data, false).unwrap();
		assert_eq!(decoded, msg);

		match decoded {
			Rcch::SiteInfo {
				bcch_cnt,
				rcch_grouping_cnt,
				ccch_paging_cnt,
				ccch_multi_cnt,
				rcch_iterate_cnt,
				..
			} => {
				assert_eq!(bcch_cnt, 1);
				assert_eq!(rcch_grouping_cnt, 1);
				assert_eq!(ccch_paging_cnt, 2);
				assert_eq!(ccch_multi_cnt, 2);
				assert_eq!(rcch_iterate_cnt, 2);
			}
			_ => unreachable!(),
		}
	}

	#[test]
	fn vcall_conn_round_trip() {
		let msg = Rcch::VCallConn {
			options: CallOptions {
				emergency: false,
				encrypted: false,
				priority: 4,
			},
			call_type: 0x01,
			src_id: 1001,
			dst_id: 50,
			cause: super::super::cause::VD_ACCEPTED,
			grp_vch_no: 7,
		};
		let data = msg.encode();
		assert_eq!(Rcch::decode(&data, false).unwrap(), msg);
	}

	#[test]
	fn reg_round_trip() {
		let msg = Rcch::Reg {
			reg_option: 0x0A,
			loc_id: 0x2345,
			src_id: 400,
			dst_id: 22,
			cause: super::super::cause::MM_REG_ACCEPTED,
		};
		let data = msg.encode();
		assert_eq!(Rcch::decode(&data, false).unwrap(), msg);
	}

	#[test]
	fn traffic_and_control_share_points() {
		// 0x03 reads VCALL_IV on traffic and VCALL_CONN on control
		let msg = Rcch::VCallConn {
			options: CallOptions::default(),
			call_type: 0,
			src_id: 9,
			dst_id: 10,
			cause: 0x10,
			grp_vch_no: 3,
		};
		let data = msg.encode();
		assert!(matches!(
			Rcch::decode(&data, false).unwrap(),
			Rcch::VCallConn { .. }
		));
	}

	#[test]
	fn unknown_types_pass_through_raw() {
		let mut data = [0u8; RCCH_LC_LENGTH_BYTES];
		data[0] = message_type::RCCH_PROP_FORM;
		data[5] = 0xEE;
		match Rcch::decode(&data, false).unwrap() {
			Rcch::Raw { data: raw } => assert_eq!(raw[5], 0xEE),
			other => panic!("wrong variant: {}", other.name()),
		}
	}
}
